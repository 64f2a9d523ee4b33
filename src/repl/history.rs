use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Retrieves a file path in the user's home directory.
///
/// # Panics
/// Panics if the home directory cannot be determined.
pub fn get_home_file(filename: String) -> PathBuf {
    dirs::home_dir()
        .expect("Failed to get home directory")
        .join(filename)
}

/// Appends a line to the history file.
pub fn append_history(line: &str, path: &PathBuf) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line.trim())?;
    writer.flush()?;
    Ok(())
}

/// Loads the command history from a file. Returns an empty vector if the
/// file cannot be opened or read.
pub fn load_history(path: &PathBuf) -> Vec<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Vec::new(),
    };

    let reader = BufReader::new(file);
    reader
        .lines()
        .filter_map(|line| {
            line.ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_append_and_load_history() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        append_history("select * from users;", &path).unwrap();
        append_history(".schema", &path).unwrap();

        let history = load_history(&path);
        assert_eq!(history, vec!["select * from users;", ".schema"]);
    }

    #[test]
    fn test_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        let history = load_history(&path);
        assert!(history.is_empty());
    }

    #[test]
    fn test_nonexistent_file() {
        let path = PathBuf::from("/nonexistent/path/test_history");
        let history = load_history(&path);
        assert!(history.is_empty());
    }
}
