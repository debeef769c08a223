/// Fixed configuration for the gate resolution protocol. All fields are
/// resolved at startup; nothing here changes while the process runs.
#[derive(Debug, Clone)]
pub(crate) struct GateConfig {
    /// The token the resolver must echo back for its response to be trusted,
    /// and the value a cached credential is compared against.
    pub(crate) validation_token: String,
    /// Endpoint queried during resolution.
    pub(crate) host_endpoint: String,
    /// Shared secret sent as the `p` query parameter.
    pub(crate) auth_secret: String,
    /// Settings-store key holding the cached destination URL.
    pub(crate) cached_url_key: String,
    /// Secret-store key holding the cached validation token.
    pub(crate) cached_token_key: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            validation_token: "GJDFHDFHFDJGSDAGKGHK".to_string(),
            host_endpoint: "https://wallen-eatery.space/ios-st-8/server.php".to_string(),
            auth_secret: "Bs2675kDjkb5Ga".to_string(),
            cached_url_key: "storedTrustedURL".to_string(),
            cached_token_key: "storedVerificationToken".to_string(),
        }
    }
}
