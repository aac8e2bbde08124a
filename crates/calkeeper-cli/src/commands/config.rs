//! Configuration commands.

use std::path::Path;

use crate::config::CliConfig;
use crate::error::CliResult;

/// Dumps the loaded configuration as TOML.
pub fn dump(config: &CliConfig, path: &Path) -> CliResult<()> {
    print!("{}", render_dump(config, path)?);
    Ok(())
}

/// Shows the configuration file path in use.
pub fn path(path: &Path) -> CliResult<()> {
    println!("config: {}", path.display());
    Ok(())
}

fn render_dump(config: &CliConfig, path: &Path) -> CliResult<String> {
    Ok(format!("# config.toml ({})\n{}\n", path.display(), config.to_toml()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_names_the_file_in_use() {
        let out = render_dump(&CliConfig::default(), Path::new("/etc/calkeeper.toml")).unwrap();
        assert!(out.starts_with("# config.toml (/etc/calkeeper.toml)\n"));
        assert!(out.contains("[auth]"));
    }
}
