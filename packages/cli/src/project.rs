use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use trellis_editor::persistence::load_styles;
use trellis_editor::{EditorSession, EngineConfig, FileStore, RealFileSystem, SerializedNode};

/// A project directory: config plus the files the editor reads and writes
pub struct Project {
    pub config: EngineConfig,
    pub store: RealFileSystem,
}

impl Project {
    /// Open `dir`, reading `trellis.config.json` from `config_dir` (or `dir`)
    pub fn open(dir: &Path, config_dir: Option<&Path>) -> Result<Self> {
        let config_dir = config_dir.unwrap_or(dir);
        let config = EngineConfig::load(config_dir)
            .with_context(|| format!("loading config from {}", config_dir.display()))?;
        Ok(Self {
            config,
            store: RealFileSystem::new(dir),
        })
    }

    pub fn root(&self) -> PathBuf {
        self.store.root().to_path_buf()
    }

    /// Read a serialized document body (JSON)
    pub fn load_document(&self, file: &str) -> Result<SerializedNode> {
        let text = self
            .store
            .get_file_content(file)
            .with_context(|| format!("reading document {}", file))?;
        serde_json::from_str(&text).with_context(|| format!("parsing document {}", file))
    }

    /// Open an editing session on a document and its stylesheet
    pub fn open_session(&self, document: &str, styles: &str) -> Result<EditorSession> {
        let body = self.load_document(document)?;
        let sheet = load_styles(&self.store, styles)?;
        Ok(EditorSession::new(self.config.clone(), document, &body, sheet)?)
    }

    /// Write the session's current body as JSON
    pub fn write_document(&mut self, file: &str, session: &EditorSession) -> Result<()> {
        let text = serde_json::to_string_pretty(&session.document().snapshot())?;
        self.store
            .save_file(file, &text)
            .with_context(|| format!("writing document {}", file))?;
        Ok(())
    }
}
