use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Writes returned images under a single output directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    output_dir: PathBuf,
}

impl ImageStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Absolute form of the output directory; relative paths resolve against
    /// the working directory at call time.
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        if self.output_dir.is_absolute() {
            return Ok(self.output_dir.clone());
        }
        let cwd = env::current_dir().context("failed to resolve working directory")?;
        Ok(cwd.join(&self.output_dir))
    }

    /// Saves `bytes` as `<prefix>-<local timestamp>.<ext>` and returns the
    /// absolute path. A name already taken within the same second gets a
    /// content digest suffix instead of being overwritten.
    pub fn save(&self, bytes: &[u8], prefix: &str, mime_type: &str) -> Result<PathBuf> {
        let dir = self.resolved_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
        let ext = extension_for_mime(mime_type);
        let mut path = dir.join(format!("{prefix}-{stamp}.{ext}"));
        if path.exists() {
            path = dir.join(format!("{prefix}-{stamp}-{}.{ext}", short_digest(bytes)));
        }

        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

/// Mime type sent upstream for an input image. Unknown extensions are sent as PNG.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid image path: directory traversal not allowed")]
pub struct PathTraversal;

/// Lexically cleans `raw` (drops `.`, folds `dir/..`). A `..` that would climb
/// above the starting point of a relative path is rejected; at a filesystem
/// root it is dropped.
pub fn clean_image_path(raw: &str) -> Result<PathBuf, PathTraversal> {
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !cleaned.has_root() {
                    return Err(PathTraversal);
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                depth += 1;
            }
            Component::RootDir | Component::Prefix(_) => cleaned.push(component.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    Ok(cleaned)
}

fn short_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{clean_image_path, extension_for_mime, mime_for_path, ImageStore, PathTraversal};

    #[test]
    fn save_creates_directory_and_returns_absolute_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::new(temp.path().join("nested").join("out"));
        let path = store.save(b"png-bytes", "generated", "image/png")?;

        assert!(path.is_absolute());
        assert!(path.starts_with(temp.path().join("nested").join("out")));
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("generated-"), "{name}");
        assert!(name.ends_with(".png"), "{name}");
        // generated-YYYY-MM-DDTHH-MM-SS.png
        assert_eq!(name.len(), "generated-".len() + 19 + ".png".len());
        assert_eq!(fs::read(&path)?, b"png-bytes".to_vec());
        Ok(())
    }

    #[test]
    fn save_uses_mime_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::new(temp.path());
        let path = store.save(b"jpeg-bytes", "edited", "image/jpeg")?;
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("jpg"));
        Ok(())
    }

    #[test]
    fn same_second_saves_do_not_overwrite() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ImageStore::new(temp.path());
        let first = store.save(b"one", "generated", "image/png")?;
        let second = store.save(b"two", "generated", "image/png")?;
        assert_ne!(first, second);
        assert_eq!(fs::read(&first)?, b"one".to_vec());
        assert_eq!(fs::read(&second)?, b"two".to_vec());
        Ok(())
    }

    #[test]
    fn relative_output_dir_resolves_against_working_directory() -> anyhow::Result<()> {
        let store = ImageStore::new("generated");
        let resolved = store.resolved_dir()?;
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("generated"));
        assert_eq!(store.output_dir(), Path::new("generated"));
        Ok(())
    }

    #[test]
    fn mime_for_path_matches_known_extensions() {
        for (path, expected) in [
            ("photo.png", "image/png"),
            ("photo.PNG", "image/png"),
            ("photo.jpg", "image/jpeg"),
            ("photo.jpeg", "image/jpeg"),
            ("photo.webp", "image/webp"),
            ("photo.gif", "image/gif"),
            ("photo.bmp", "image/png"),
            ("photo", "image/png"),
        ] {
            assert_eq!(mime_for_path(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn extension_for_mime_defaults_to_png() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("IMAGE/WEBP"), "webp");
        assert_eq!(extension_for_mime("image/gif"), "gif");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }

    #[test]
    fn clean_image_path_rejects_traversal() {
        for raw in [
            "../secret.png",
            "../../etc/passwd",
            "images/../../secret.png",
            "./a/b/../../../c.png",
        ] {
            assert_eq!(clean_image_path(raw), Err(PathTraversal), "{raw}");
        }
    }

    #[test]
    fn clean_image_path_folds_harmless_segments() {
        assert_eq!(clean_image_path("./img.png"), Ok(PathBuf::from("img.png")));
        assert_eq!(
            clean_image_path("a/./b/../c.png"),
            Ok(PathBuf::from("a/c.png"))
        );
        assert_eq!(clean_image_path("a/.."), Ok(PathBuf::from(".")));
        assert_eq!(
            clean_image_path("my..photo.png"),
            Ok(PathBuf::from("my..photo.png"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn clean_image_path_keeps_absolute_paths_rooted() {
        assert_eq!(
            clean_image_path("/tmp/../tmp/x.png"),
            Ok(PathBuf::from("/tmp/x.png"))
        );
        assert_eq!(clean_image_path("/../x.png"), Ok(PathBuf::from("/x.png")));
    }
}
