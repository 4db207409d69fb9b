//! Configuration access port trait.
//!
//! Typed getters return `Ok(None)` for a missing key and `Err` with a reason
//! when the value is present but malformed.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, String>;
    fn get_uint(&self, section: &str, key: &str) -> Result<Option<u64>, String>;
}
