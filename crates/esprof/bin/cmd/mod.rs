pub mod instrument;
pub mod run;

use std::{fs, path::Path};

use eyre::{Result, WrapErr};

pub(crate) fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}
