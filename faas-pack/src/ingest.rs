use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PackError;

/// Project descriptor synthesised for single-file uploads. The app and
/// component names use underscores rather than hyphens: the descriptor
/// grammar rejects hyphen-separated words that start with a digit.
const SPIN_TOML_TEMPLATE: &str = r#"spin_manifest_version = 2

[application]
name = "{app_name}"
version = "0.1.0"
authors = ["Auto Generated"]
description = ""

[[trigger.http]]
route = "/..."
component = "{component_name}"

[component.{component_name}]
source = "app.wasm"
[component.{component_name}.build]
command = "componentize-py -w spin-http componentize {module_name} -o app.wasm"
"#;

/// Appended when a source defines an `init_incoming_handler` factory but no
/// `IncomingHandler` class, so the runtime's discovery contract still holds.
const INCOMING_HANDLER_SHIM: &str = r#"

# Auto-generated shim to expose IncomingHandler for spin-python runtime
from spin_sdk.http import IncomingHandler as _BaseIncomingHandler

try:
    _factory = init_incoming_handler
except NameError:
    _factory = None

if _factory is not None:
    class IncomingHandler(_BaseIncomingHandler):
        def __init__(self):
            self._delegate = _factory()

        def handle_request(self, request):
            return self._delegate.handle_request(request)
"#;

/// Materialises uploaded sources into a scratch directory.
#[derive(Clone, Debug, Default)]
pub struct FileIngestor;

impl FileIngestor {
    pub fn new() -> Self {
        Self
    }

    /// Fresh scratch directory under the system temp root. The directory is
    /// deliberately not removed on drop: later pipeline stages re-enter it.
    pub fn create_work_dir(&self) -> Result<PathBuf, PackError> {
        let dir = tempfile::Builder::new().prefix("spin_build_").tempdir()?;
        Ok(dir.into_path())
    }

    /// Route an upload by filename extension and materialise the project
    /// tree into `work_dir`.
    pub fn ingest(
        &self,
        data: &[u8],
        filename: &str,
        work_dir: &Path,
    ) -> Result<PathBuf, PackError> {
        if filename.ends_with(".zip") {
            self.handle_zip(data, work_dir)
        } else if filename.ends_with(".py") {
            self.handle_single_py(data, filename, work_dir)
        } else {
            Err(PackError::UnsupportedFileType(filename.to_string()))
        }
    }

    /// Extract an archive and require the project descriptor at its root.
    pub fn handle_zip(&self, zip_data: &[u8], work_dir: &Path) -> Result<PathBuf, PackError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_data))
            .map_err(|_| PackError::InvalidArchive)?;
        archive
            .extract(work_dir)
            .map_err(|_| PackError::InvalidArchive)?;

        if !work_dir.join("spin.toml").exists() {
            return Err(PackError::MissingDescriptor);
        }
        Ok(work_dir.to_path_buf())
    }

    /// Write a single source file under a sanitised name and synthesise a
    /// minimal project descriptor around it.
    pub fn handle_single_py(
        &self,
        py_content: &[u8],
        filename: &str,
        work_dir: &Path,
    ) -> Result<PathBuf, PackError> {
        let filename = filename.trim();
        let mut source = String::from_utf8(py_content.to_vec())
            .map_err(|e| PackError::InvalidSource(e.to_string()))?;

        if !source.contains("class IncomingHandler") && source.contains("init_incoming_handler") {
            info!(filename, "injecting IncomingHandler shim");
            source.push_str(INCOMING_HANDLER_SHIM);
        }

        let module_name = module_name_from(filename);
        let app_name = module_name.clone();

        std::fs::write(work_dir.join(format!("{module_name}.py")), source)?;
        std::fs::write(
            work_dir.join("spin.toml"),
            render_spin_toml(&app_name, &app_name, &module_name),
        )?;

        Ok(work_dir.to_path_buf())
    }
}

/// Filename stem, trimmed, with spaces replaced by underscores so the result
/// is a legal module name.
fn module_name_from(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string())
        .trim()
        .replace(' ', "_")
}

fn render_spin_toml(app_name: &str, component_name: &str, module_name: &str) -> String {
    SPIN_TOML_TEMPLATE
        .replace("{app_name}", app_name)
        .replace("{component_name}", component_name)
        .replace("{module_name}", module_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            for (name, content) in entries {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn zip_with_descriptor_extracts() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        let data = make_zip(&[
            ("spin.toml", "spin_manifest_version = 2\n"),
            ("app.py", "class IncomingHandler: ...\n"),
        ]);

        let app_dir = ingestor
            .ingest(&data, "bundle.zip", work_dir.path())
            .unwrap();
        assert!(app_dir.join("spin.toml").exists());
        assert!(app_dir.join("app.py").exists());
    }

    #[test]
    fn zip_without_descriptor_is_rejected() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        let data = make_zip(&[("foo.py", "x = 1\n")]);

        let err = ingestor
            .ingest(&data, "bundle.zip", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, PackError::MissingDescriptor));
        assert!(err.to_string().contains("spin.toml"));
    }

    #[test]
    fn nested_descriptor_does_not_count() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        let data = make_zip(&[("sub/spin.toml", "spin_manifest_version = 2\n")]);

        let err = ingestor
            .ingest(&data, "bundle.zip", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, PackError::MissingDescriptor));
    }

    #[test]
    fn garbage_bytes_are_an_invalid_archive() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        let err = ingestor
            .ingest(b"not a zip", "bundle.zip", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, PackError::InvalidArchive));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        let err = ingestor
            .ingest(b"", "app.tar.gz", work_dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[test]
    fn single_file_gets_descriptor_with_module_name() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        ingestor
            .ingest(b"class IncomingHandler: ...\n", "my handler.py", work_dir.path())
            .unwrap();

        assert!(work_dir.path().join("my_handler.py").exists());
        let toml = std::fs::read_to_string(work_dir.path().join("spin.toml")).unwrap();
        assert!(toml.contains("name = \"my_handler\""));
        assert!(toml.contains("[component.my_handler]"));
        assert!(toml.contains("componentize my_handler -o app.wasm"));
        assert!(!toml.contains('{'));
    }

    #[test]
    fn shim_injected_for_factory_without_class() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        ingestor
            .ingest(
                b"def init_incoming_handler():\n    return object()\n",
                "app.py",
                work_dir.path(),
            )
            .unwrap();

        let source = std::fs::read_to_string(work_dir.path().join("app.py")).unwrap();
        assert!(source.contains("class IncomingHandler(_BaseIncomingHandler)"));
        assert!(source.contains("_factory = init_incoming_handler"));
    }

    #[test]
    fn shim_not_injected_when_class_present() {
        let ingestor = FileIngestor::new();
        let work_dir = tempfile::tempdir().unwrap();
        ingestor
            .ingest(
                b"class IncomingHandler:\n    pass\n\ndef init_incoming_handler():\n    ...\n",
                "app.py",
                work_dir.path(),
            )
            .unwrap();

        let source = std::fs::read_to_string(work_dir.path().join("app.py")).unwrap();
        assert!(!source.contains("_BaseIncomingHandler"));
    }

    #[test]
    fn work_dirs_carry_the_pipeline_prefix() {
        let ingestor = FileIngestor::new();
        let dir = ingestor.create_work_dir().unwrap();
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("spin_build_"), "unexpected name: {name}");
        std::fs::remove_dir_all(dir).ok();
    }
}
