use agretro_runtime::RuntimeConfig;
use agretro_store::Store;
use anyhow::Result;
use once_cell::sync::OnceCell;

/// Resolved configuration plus a lazily opened store handle. Commands
/// that never touch the database never create one.
pub struct ExecutionContext {
    config: RuntimeConfig,
    store: OnceCell<Store>,
}

impl ExecutionContext {
    pub fn new(db_flag: Option<&str>, source_flags: &[String]) -> Result<Self> {
        Ok(Self {
            config: RuntimeConfig::resolve(db_flag, source_flags)?,
            store: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Opens (creating if needed) the store on first use.
    pub fn store(&self) -> Result<&Store> {
        Ok(self
            .store
            .get_or_try_init(|| Store::open(&self.config.db_path))?)
    }

    /// Like [`ExecutionContext::store`], but `None` when no database
    /// file exists yet. Read-only commands use this so they do not
    /// create an empty store as a side effect.
    pub fn open_existing(&self) -> Result<Option<&Store>> {
        if !self.config.db_path.exists() {
            return Ok(None);
        }
        self.store().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context_for(db_path: PathBuf) -> ExecutionContext {
        ExecutionContext {
            config: RuntimeConfig {
                db_path,
                sources: Vec::new(),
            },
            store: OnceCell::new(),
        }
    }

    #[test]
    fn store_opens_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("agretro.db");
        let ctx = context_for(db_path.clone());

        assert!(ctx.store.get().is_none());
        assert!(!db_path.exists());

        ctx.store().unwrap();
        assert!(ctx.store.get().is_some());
        assert!(db_path.exists());
    }

    #[test]
    fn open_existing_does_not_create_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("agretro.db");
        let ctx = context_for(db_path.clone());

        assert!(ctx.open_existing().unwrap().is_none());
        assert!(!db_path.exists());

        ctx.store().unwrap();
        assert!(ctx.open_existing().unwrap().is_some());
    }
}
