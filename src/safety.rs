//! Safety checks run before any collection file is overwritten.
//!
//! The pipeline reads its input once and then rewrites several files; a
//! misconfigured path could make it clobber the raw export or write two
//! collections into the same file.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that the configured output paths are safe to overwrite.
///
/// Checks:
/// - No output may be the input export
/// - Outputs must be pairwise distinct
/// - Outputs must name a file, not a bare directory
///
/// # Arguments
/// * `input` - The raw export the run reads from
/// * `outputs` - `(role, path)` pairs the run will write, e.g. `("display", ...)`
///
/// # Returns
/// * `Ok(())` if every output path is safe
/// * `Err` naming the offending role(s) otherwise
pub fn validate_output_paths(input: &Path, outputs: &[(&str, &Path)]) -> Result<()> {
    for (role, path) in outputs {
        if path.file_name().is_none() {
            bail!(
                "Safety check failed: {} output '{}' does not name a file",
                role,
                path.display()
            );
        }
        if same_path(path, input) {
            bail!(
                "Safety check failed: {} output '{}' cannot be the input export",
                role,
                path.display()
            );
        }
    }

    for (i, (role_a, path_a)) in outputs.iter().enumerate() {
        for (role_b, path_b) in &outputs[i + 1..] {
            if same_path(path_a, path_b) {
                bail!(
                    "Safety check failed: {} and {} outputs both point to '{}'",
                    role_a,
                    role_b,
                    path_a.display()
                );
            }
        }
    }

    Ok(())
}

/// Compare component-wise so `data/./x.json` and `data/x.json` collide.
fn same_path(a: &Path, b: &Path) -> bool {
    a.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .eq(b.components().filter(|c| !matches!(c, std::path::Component::CurDir)))
}
