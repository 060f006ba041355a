// src/constants.rs
//
// Centralized constants for the Pollination client to avoid hardcoded values
// throughout the codebase

/// Default API endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://api.pollination.cloud";

/// Environment variable overriding the API endpoint
pub const ENV_ENDPOINT: &str = "QB_POLLINATION_ENDPOINT";

/// Environment variable holding the API key id
pub const ENV_API_KEY_ID: &str = "QB_POLLINATION_API_KEY_ID";

/// Environment variable holding the API key secret
pub const ENV_API_KEY_SECRET: &str = "QB_POLLINATION_API_KEY_SECRET";

/// Environment variable holding a ready-made access token (JWT)
pub const ENV_ACCESS_TOKEN: &str = "QB_POLLINATION_TOKEN";

/// Environment variable for the per-request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "QB_POLLINATION_TIMEOUT_SECS";

/// Default connect timeout for API and transfer requests (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default pool idle timeout (seconds)
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// The only status code a presigned form POST may return to count as uploaded
pub const UPLOAD_SUCCESS_STATUS: u16 = 204;

/// Name of the multipart part that carries the file body
pub const UPLOAD_FILE_FIELD: &str = "file";

/// Suffix of the transient archive written next to the extraction folder
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// File name of the simulation status document written after a bulk download
pub const SIMULATION_STATUS_FILE: &str = "simulation.yml";

/// Manifest name accepted when a package folder has no `recipe.yaml`/`operator.yaml`
pub const PACKAGE_MANIFEST_FALLBACK: &str = "package.yaml";

/// README names looked up in a package folder; the first is used when writing
pub const README_FILES: &[&str] = &["README.md", "readme.md", "README"];

/// LICENSE names looked up in a package folder; the first is used when writing
pub const LICENSE_FILES: &[&str] = &["LICENSE", "LICENSE.md", "license"];

/// Default number of upload workers: one less than the available CPUs, never zero
pub fn default_upload_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
