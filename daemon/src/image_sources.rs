use glob::glob;
use std::path::{Path, PathBuf};

/// File extensions picked up when scanning directories and globs
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "gif"];

/// Resolve sources (files, directories or glob patterns) into absolute image
/// paths, in the order the sources were given.
///
/// `~` is expanded. Directories are scanned one level deep. Duplicates are
/// dropped, keeping the first occurrence.
pub fn resolve(sources: &[String]) -> Vec<String> {
    let mut images: Vec<PathBuf> = Vec::new();

    for source in sources {
        let expanded = shellexpand::tilde(source);
        let source_path = Path::new(expanded.as_ref());

        if source_path.is_file() {
            if has_image_extension(source_path) {
                images.push(source_path.to_path_buf());
            } else {
                log::warn!("Skipping {}: not a supported image type", source);
            }
            continue;
        }

        if source_path.is_dir() {
            images.extend(scan_directory(source_path));
            continue;
        }

        match glob(&expanded) {
            Ok(entries) => {
                let mut matched: Vec<PathBuf> = entries
                    .flatten()
                    .filter(|entry| entry.is_file() && has_image_extension(entry))
                    .collect();
                matched.sort();
                if matched.is_empty() {
                    log::warn!("No images found for '{}'", source);
                }
                images.extend(matched);
            }
            Err(e) => {
                log::warn!("Failed to glob pattern '{}': {}", source, e);
            }
        }
    }

    let mut resolved: Vec<String> = Vec::with_capacity(images.len());
    for path in images {
        let path = std::path::absolute(&path).unwrap_or(path);
        let path = path.to_string_lossy().into_owned();
        if !resolved.contains(&path) {
            resolved.push(path);
        }
    }
    resolved
}

/// Image files directly inside `dir`, sorted by path
fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to read directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort();
    images
}

/// Case-insensitive extension check against [`IMAGE_EXTENSIONS`]
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension(Path::new("a.png")));
        assert!(has_image_extension(Path::new("a.JPG")));
        assert!(has_image_extension(Path::new("/x/y/z.webp")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("noext")));
    }

    #[test]
    fn test_directory_is_scanned_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.jpg");
        touch(dir.path(), "a.png");
        touch(dir.path(), "readme.txt");
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "c.png");

        let found = resolve(&[dir.path().to_string_lossy().into_owned()]);

        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.png"));
        assert!(found[1].ends_with("b.jpg"));
    }

    #[test]
    fn test_files_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        let single = touch(dir.path(), "single.bmp");
        touch(dir.path(), "x1.png");
        touch(dir.path(), "x2.png");
        touch(dir.path(), "x3.txt");

        let pattern = dir.path().join("x*").to_string_lossy().into_owned();
        let found = resolve(&[single.to_string_lossy().into_owned(), pattern]);

        assert_eq!(found.len(), 3);
        assert!(found[0].ends_with("single.bmp"));
        assert!(found[1].ends_with("x1.png"));
        assert!(found[2].ends_with("x2.png"));
    }

    #[test]
    fn test_duplicates_and_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let image = touch(dir.path(), "a.png").to_string_lossy().into_owned();
        let missing = dir.path().join("nope.png").to_string_lossy().into_owned();

        let found = resolve(&[image.clone(), image, missing]);

        assert_eq!(found.len(), 1);
        assert!(Path::new(&found[0]).is_absolute());
    }
}
