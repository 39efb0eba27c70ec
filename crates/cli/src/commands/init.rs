//! `harbor init` — Write a default config file.

use std::path::Path;

use harbor_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path);

    if write_default(&path, force)? {
        println!("✅ Created config at: {}", path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set GEMINI_API_KEY (or api_key in the file)");
        println!("   2. Point retrieval.url at your Chroma server");
        println!("   3. Run `harbor doctor`, then `harbor serve`");
    } else {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Use --force to overwrite it.");
    }
    Ok(())
}

/// Returns whether the file was written.
fn write_default(path: &Path, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
