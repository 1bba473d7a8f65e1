use color_eyre::eyre;
use std::io::Write;
use std::path::Path;

/// Writes the exposition to `path`, or to stdout.
///
/// Files are replaced atomically so a reader never observes a partial exposition.
pub fn write(path: Option<&Path>, text: &str) -> eyre::Result<()> {
    let Some(path) = path else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_file() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mongodb.prom");
        write(Some(&path), "mongodb_up 1\n")?;
        write(Some(&path), "mongodb_up 0\n")?;
        assert_eq!(std::fs::read_to_string(&path)?, "mongodb_up 0\n");
        assert!(!dir.path().join("mongodb.prom.tmp").exists());
        Ok(())
    }
}
