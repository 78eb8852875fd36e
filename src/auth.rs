//! OAuth2 authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::path::Path;

use crate::error::{CleanerError, Result};

/// Read, label and trash access; never permanent deletion
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

pub const REQUIRED_SCOPES: &[&str] = &[MODIFY_SCOPE];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Runs the installed-app flow on first use and caches tokens at
/// `token_cache_path`. When `force` is set the cached token is removed first so
/// the browser consent runs again.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    force: bool,
) -> Result<GmailHub> {
    if !credentials_path.exists() {
        return Err(CleanerError::AuthError(format!(
            "Credentials file not found at {:?}. Download an OAuth client (Desktop app) from the Google Cloud console.",
            credentials_path
        )));
    }

    if force {
        clear_token_cache(token_cache_path).await?;
    }

    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| CleanerError::AuthError(format!("Failed to read credentials: {}", e)))?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| CleanerError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so concurrent requests share a cached one
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| CleanerError::AuthError(format!("Failed to obtain token: {}", e)))?;

    secure_token_file(token_cache_path).await?;

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| CleanerError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    tracing::info!("Authenticated with Gmail API");
    Ok(Gmail::new(client, auth))
}

/// Remove a cached token. A missing file is not an error.
pub async fn clear_token_cache(token_cache_path: &Path) -> Result<()> {
    match tokio::fs::remove_file(token_cache_path).await {
        Ok(()) => {
            tracing::info!("Removed cached token at {:?}", token_cache_path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Restrict the token file to owner read/write
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // Windows relies on the profile directory ACLs
    Ok(())
}
