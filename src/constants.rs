//! Identity and Graph API constants

/// Default multi-tenant public client used for interactive sign-in when no
/// CLIENT_ID is configured. Users see a consent prompt on first use; no admin
/// consent is required for the delegated permissions involved.
pub const DEFAULT_CLIENT_ID: &str = "ca696137-503f-4489-bdf4-7cb76e272639";

/// Default tenant for interactive sign-in (any organization).
pub const DEFAULT_TENANT_ID: &str = "common";

/// Default redirect URI for interactive sign-in (no port required).
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Microsoft Graph REST endpoint, v1.0.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Broad resource-default scope used by app-only and provided-token modes.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Narrow delegated scopes requested in interactive mode.
pub const GRAPH_DELEGATED_SCOPES: [&str; 3] = [
    "https://graph.microsoft.com/Calendars.ReadWrite",
    "https://graph.microsoft.com/People.Read",
    "https://graph.microsoft.com/User.Read",
];

/// Microsoft identity platform authority.
pub const LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// OAuth 2.0 token endpoint for a tenant.
pub fn token_endpoint(tenant_id: &str) -> String {
    format!("{}/{}/oauth2/v2.0/token", LOGIN_BASE_URL, tenant_id)
}

/// OAuth 2.0 device authorization endpoint for a tenant.
pub fn device_code_endpoint(tenant_id: &str) -> String {
    format!("{}/{}/oauth2/v2.0/devicecode", LOGIN_BASE_URL, tenant_id)
}
