//! JavaScript execution service.

use coursegrade_core::model::Language;

use crate::client::RemoteInterpreter;

/// Path of the run endpoint under the service's base URL.
pub const EXECUTE_PATH: &str = "/execute";

/// Client for a JavaScript service at `base_url`.
pub fn interpreter(base_url: &str) -> RemoteInterpreter {
    RemoteInterpreter::new(Language::JavaScript, base_url, EXECUTE_PATH)
}
