//! Per-session storage for generated files.
//!
//! Every session gets its own directory under the results root:
//! `<base>/<YYYYMMDD>/<HH>_<HHMMSS><ts>` where `<ts>` is the first two
//! digits of the Unix timestamp. The directory is created on first write.

use chrono::{Local, Utc};
use regex_lite::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(\w*)\n([\s\S]*?)\n```").expect("valid code block regex"));

static FILENAME_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:filename|文件名)[:：]\s*([^\s]+)").expect("valid filename regex"));

#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
    session_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let now = Local::now();
        let ts = Utc::now().timestamp().to_string();
        let name = format!("{}_{}{}", now.format("%H"), now.format("%H%M%S"), &ts[..2.min(ts.len())]);
        let session_dir = base_dir.join(now.format("%Y%m%d").to_string()).join(name);
        Self { base_dir, session_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    async fn target_dir(&self, subdir: Option<&str>) -> io::Result<PathBuf> {
        let dir = match subdir.map(file_name_only).filter(|s| !s.is_empty()) {
            Some(sub) => self.session_dir.join(sub),
            None => self.session_dir.clone(),
        };
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Write `content` under the session dir. A filename without an
    /// extension gets one guessed from the content.
    pub async fn save_file(&self, content: &str, filename: &str, subdir: Option<&str>) -> io::Result<PathBuf> {
        let mut name = file_name_only(filename).to_string();
        if name.is_empty() || name.chars().all(|c| c == '.') {
            name = "file".into();
        }
        if !name.contains('.') {
            name.push('.');
            name.push_str(infer_extension(content));
        }

        let path = self.target_dir(subdir).await?.join(name);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), bytes = content.len(), "Saved file");
        Ok(path)
    }

    pub async fn save_bytes(&self, content: &[u8], filename: &str, subdir: Option<&str>) -> io::Result<PathBuf> {
        let path = self.target_dir(subdir).await?.join(file_name_only(filename));
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    /// Copy an existing file into the session dir, keeping its name unless
    /// `target_name` is given.
    pub async fn copy_file(
        &self,
        source: &Path,
        target_name: Option<&str>,
        subdir: Option<&str>,
    ) -> io::Result<PathBuf> {
        let name = match target_name {
            Some(name) => file_name_only(name).to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?,
        };
        let target = self.target_dir(subdir).await?.join(name);
        tokio::fs::copy(source, &target).await?;
        Ok(target)
    }

    /// Every file under the session dir (or one of its subdirs), sorted.
    pub async fn list_files(&self, subdir: Option<&str>) -> io::Result<Vec<PathBuf>> {
        let root = match subdir {
            Some(sub) => self.session_dir.join(file_name_only(sub)),
            None => self.session_dir.clone(),
        };
        if !tokio::fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Extract every code block in `markdown` and save it. A block that
    /// cannot be written is logged and skipped.
    pub async fn save_files_from_markdown(&self, markdown: &str, subdir: Option<&str>) -> Vec<PathBuf> {
        let mut saved = Vec::new();
        for (filename, code) in extract_code_blocks(markdown) {
            match self.save_file(&code, &filename, subdir).await {
                Ok(path) => saved.push(path),
                Err(e) => warn!(filename = %filename, error = %e, "Skipping code block that could not be saved"),
            }
        }
        saved
    }
}

/// Strip any directory part so writes stay inside the session dir.
fn file_name_only(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim()
}

fn infer_extension(content: &str) -> &'static str {
    let braces = content.contains('{') && content.contains('}');
    if content.contains("<html") || content.contains("<!DOCTYPE html") {
        "html"
    } else if content.contains("def ") || content.contains("import ") || content.contains("class ") {
        "py"
    } else if braces && (content.contains("function") || content.contains(':')) {
        "js"
    } else if braces && content.contains("body") {
        "css"
    } else {
        "txt"
    }
}

/// Fenced code blocks as `(filename, code)`, in document order.
///
/// `filename: x` hints in the text name the blocks in order; the rest get
/// a default name from the fence language.
pub fn extract_code_blocks(markdown: &str) -> Vec<(String, String)> {
    let hints: Vec<&str> = FILENAME_HINT
        .captures_iter(markdown)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    CODE_BLOCK
        .captures_iter(markdown)
        .enumerate()
        .map(|(i, caps)| {
            let lang = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
            let code = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let n = i + 1;
            let filename = match hints.get(i) {
                Some(hint) => hint.to_string(),
                None if lang == "html" || code.contains("<html") => format!("index_{n}.html"),
                None => match lang.as_str() {
                    "python" | "py" => format!("script_{n}.py"),
                    "javascript" | "js" => format!("script_{n}.js"),
                    "css" => format!("style_{n}.css"),
                    "json" => format!("data_{n}.json"),
                    _ => format!("file_{n}.txt"),
                },
            };
            (filename, code)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_layout() {
        let fm = FileManager::new("/tmp/results");
        let rel = fm.session_dir().strip_prefix("/tmp/results").unwrap();
        let parts: Vec<String> = rel.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 8);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        // HH_HHMMSS + two timestamp digits
        assert_eq!(parts[1].len(), 11);
        assert_eq!(&parts[1][2..3], "_");
        assert_eq!(&parts[1][..2], &parts[1][3..5]);
    }

    #[test]
    fn extension_inference() {
        assert_eq!(infer_extension("<!DOCTYPE html><p>x</p>"), "html");
        assert_eq!(infer_extension("import os\nprint(1)"), "py");
        assert_eq!(infer_extension("function f() { return 1 }"), "js");
        assert_eq!(infer_extension("body { }"), "css");
        assert_eq!(infer_extension("hello"), "txt");
    }

    #[test]
    fn extracts_blocks_with_default_names() {
        let md = "Intro\n```python\nprint('hi')\n```\nthen\n```js\nconsole.log(1)\n```\n```\nplain\n```\n```json\n{}\n```\n```css\nbody{}\n```\n```\n<html></html>\n```";
        let blocks = extract_code_blocks(md);
        let names: Vec<&str> = blocks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["script_1.py", "script_2.js", "file_3.txt", "data_4.json", "style_5.css", "index_6.html"]
        );
        assert_eq!(blocks[0].1, "print('hi')");
    }

    #[test]
    fn filename_hints_apply_in_order() {
        let md = "filename: app.py\n```python\nx = 1\n```\n文件名：page.html\n```html\n<p>hi</p>\n```\n```css\np{}\n```";
        let blocks = extract_code_blocks(md);
        assert_eq!(blocks[0].0, "app.py");
        assert_eq!(blocks[1].0, "page.html");
        assert_eq!(blocks[2].0, "style_3.css");
    }

    #[test]
    fn no_blocks() {
        assert!(extract_code_blocks("no code here").is_empty());
    }

    #[tokio::test]
    async fn save_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::new(dir.path());
        assert!(fm.list_files(None).await.unwrap().is_empty());

        let html = fm.save_file("<html></html>", "page", None).await.unwrap();
        assert!(html.ends_with("page.html"));
        let nested = fm.save_file("x", "../../escape.txt", Some("code")).await.unwrap();
        assert!(nested.starts_with(fm.session_dir().join("code")));
        assert_eq!(nested.file_name().unwrap(), "escape.txt");

        let files = fm.list_files(None).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fm.list_files(Some("code")).await.unwrap(), vec![nested]);
    }

    #[tokio::test]
    async fn copy_keeps_or_renames() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.txt");
        std::fs::write(&source, "data").unwrap();

        let fm = FileManager::new(dir.path().join("results"));
        let same = fm.copy_file(&source, None, None).await.unwrap();
        assert_eq!(same.file_name().unwrap(), "src.txt");
        let renamed = fm.copy_file(&source, Some("dst.txt"), Some("copies")).await.unwrap();
        assert_eq!(std::fs::read_to_string(renamed).unwrap(), "data");
    }

    #[tokio::test]
    async fn saves_markdown_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::new(dir.path());
        let saved = fm
            .save_files_from_markdown("```py\nprint(1)\n```\n```css\na{}\n```", None)
            .await;
        assert_eq!(saved.len(), 2);
        assert!(saved[0].ends_with("script_1.py"));
        assert_eq!(std::fs::read_to_string(&saved[1]).unwrap(), "a{}");
    }

    #[tokio::test]
    async fn unwritable_block_does_not_drop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::new(dir.path());
        std::fs::create_dir_all(fm.session_dir().join("taken.py")).unwrap();

        let md = "filename: taken.py\n```py\nprint(1)\n```\n```py\nprint(2)\n```\n```css\na{}\n```";
        assert_eq!(extract_code_blocks(md)[0].0, "taken.py");

        let saved = fm.save_files_from_markdown(md, None).await;
        let names: Vec<String> = saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["script_2.py", "style_3.css"]);
    }

    #[tokio::test]
    async fn dot_names_fall_back_to_a_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::new(dir.path());
        let path = fm.save_file("print(1)\nimport os", "..", None).await.unwrap();
        assert_eq!(path, fm.session_dir().join("file.py"));
    }
}
