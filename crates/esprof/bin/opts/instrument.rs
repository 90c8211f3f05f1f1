use std::path::Path;

use clap::Parser;
use esprof_instrument::{Category, InstrumentConfig};
use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize, Parser)]
pub struct InstrumentOpts {
    /// Script name used in event locations. If not provided, the file name is used.
    #[clap(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Leave a category of operations uninstrumented. Can be given several times.
    #[clap(long, value_name = "CATEGORY")]
    pub disable: Vec<Category>,
}

impl InstrumentOpts {
    pub fn config(&self, file: &Path) -> InstrumentConfig {
        let name = self.name.clone().unwrap_or_else(|| {
            file.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
        });
        self.disable
            .iter()
            .fold(InstrumentConfig::default().with_script_name(name), |config, category| {
                config.disable(*category)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let opts = InstrumentOpts::parse_from(["opts", "--disable", "call", "--disable", "alloc"]);
        let config = opts.config(Path::new("dir/app.js"));
        assert_eq!(config.script_name, "app.js");
        assert!(!config.categories.contains(&Category::Call));
        assert!(!config.categories.contains(&Category::Alloc));
        assert!(config.categories.contains(&Category::PropRead));

        let opts = InstrumentOpts::parse_from(["opts", "--name", "main"]);
        assert_eq!(opts.config(Path::new("app.js")).script_name, "main");
    }
}
