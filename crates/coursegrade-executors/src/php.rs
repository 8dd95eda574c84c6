//! PHP execution service.

use coursegrade_core::model::Language;

use crate::client::RemoteInterpreter;

/// Path of the run endpoint under the service's base URL.
pub const EXECUTE_PATH: &str = "/server.php";

const OPEN_TAG: &str = "<?php";

/// Client for a PHP service at `base_url`. The service adds its own open
/// tag, so sources are sent without one.
pub fn interpreter(base_url: &str) -> RemoteInterpreter {
    RemoteInterpreter::new(Language::Php, base_url, EXECUTE_PATH).with_preprocessor(prepare_source)
}

/// Trim the source and drop a leading `<?php` tag.
pub fn prepare_source(source: &str) -> String {
    let source = source.trim();
    match source.strip_prefix(OPEN_TAG) {
        Some(rest) => rest.trim().to_string(),
        None => source.to_string(),
    }
}
