//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .filter(|value| !value.trim().is_empty())
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, String> {
        if self.get_string(section, key).is_none() {
            return Ok(None);
        }
        self.config.getfloat(section, key)
    }

    fn get_uint(&self, section: &str, key: &str) -> Result<Option<u64>, String> {
        if self.get_string(section, key).is_none() {
            return Ok(None);
        }
        self.config.getuint(section, key)
    }
}
