//! Kernel config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use mycelia_core::error::{MyceliaError, Result};

pub use schema::{
    BenchSection, KernelSection, MyceliaConfig, OpsSection, ReportConfig, StatusConfig,
};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<MyceliaConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        MyceliaError::Internal(format!("read config failed ({}): {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MyceliaConfig> {
    let cfg: MyceliaConfig = serde_yaml::from_str(s)
        .map_err(|e| MyceliaError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
