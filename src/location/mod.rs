//! Transfer endpoints and option records
//!
//! A [`LocationDescriptor`] is either a local filesystem path or a remote
//! resource (account URL + unencoded path) with its credential. Descriptors
//! are immutable once built; [`command`] reads them to produce the argument
//! vector and the human-readable command string.

pub mod command;

pub use command::{CommandLine, ShellFlavor};

use serde::Serialize;
use std::fmt;
use std::path::{PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

/// Opaque token refresh callback, invoked periodically for the life of a job
#[derive(Clone)]
pub struct TokenRefresher(Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>);

impl TokenRefresher {
    pub fn new<F>(refresh: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(refresh))
    }

    pub fn refresh(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenRefresher(..)")
    }
}

/// Bearer token forwarded to the executable through its environment
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry as seconds since the Unix epoch
    pub expires_on: Option<i64>,
    pub refresher: Option<TokenRefresher>,
}

impl OAuthCredential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_on: None,
            refresher: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_on: i64) -> Self {
        self.expires_on = Some(expires_on);
        self
    }

    pub fn with_refresher(mut self, refresher: TokenRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }
}

#[derive(Debug, Clone)]
pub enum RemoteCredential {
    /// Public resource, no credential
    Anonymous,
    /// Shared access signature query string, with or without the leading '?'
    Sas(String),
    OAuth(OAuthCredential),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLocation {
    pub path: PathBuf,
    /// Expand to the directory's contents (`<path>/*`)
    pub directory_wildcard: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteLocation {
    /// Scheme and host, e.g. `https://account.blob.core.windows.net`
    pub account_url: String,
    /// Unencoded resource path below the account, e.g. `container/dir/file.txt`
    pub path: String,
    pub credential: RemoteCredential,
    pub tenant_id: Option<String>,
    pub snapshot: Option<String>,
    pub directory_wildcard: bool,
}

impl RemoteLocation {
    pub fn new(account_url: impl Into<String>, path: impl Into<String>, credential: RemoteCredential) -> Self {
        Self {
            account_url: account_url.into(),
            path: path.into(),
            credential,
            tenant_id: None,
            snapshot: None,
            directory_wildcard: false,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    pub fn directory_wildcard(mut self) -> Self {
        self.directory_wildcard = true;
        self
    }

    pub fn oauth(&self) -> Option<&OAuthCredential> {
        match &self.credential {
            RemoteCredential::OAuth(credential) => Some(credential),
            _ => None,
        }
    }

    /// Resource URL with encoded path, wildcard suffix, SAS and snapshot query
    pub fn to_url(&self) -> String {
        let mut url = self.account_url.trim_end_matches('/').to_string();

        let path = self.path.trim_matches('/');
        if !path.is_empty() {
            url.push('/');
            url.push_str(&encode_path(path));
        }
        if self.directory_wildcard {
            url.push_str("/*");
        }

        let mut query = Vec::new();
        if let RemoteCredential::Sas(sas) = &self.credential {
            let sas = sas.trim_start_matches('?');
            if !sas.is_empty() {
                query.push(sas.to_string());
            }
        }
        if let Some(snapshot) = &self.snapshot {
            query.push(format!("snapshot={}", urlencoding::encode(snapshot)));
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        url
    }
}

/// Structured description of a transfer endpoint
#[derive(Debug, Clone)]
pub enum LocationDescriptor {
    Local(LocalLocation),
    Remote(RemoteLocation),
}

impl LocationDescriptor {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        LocationDescriptor::Local(LocalLocation {
            path: path.into(),
            directory_wildcard: false,
        })
    }

    pub fn local_directory(path: impl Into<PathBuf>) -> Self {
        LocationDescriptor::Local(LocalLocation {
            path: path.into(),
            directory_wildcard: true,
        })
    }

    pub fn remote(location: RemoteLocation) -> Self {
        LocationDescriptor::Remote(location)
    }

    pub fn is_directory_wildcard(&self) -> bool {
        match self {
            LocationDescriptor::Local(local) => local.directory_wildcard,
            LocationDescriptor::Remote(remote) => remote.directory_wildcard,
        }
    }

    pub fn oauth(&self) -> Option<(&OAuthCredential, Option<&str>)> {
        match self {
            LocationDescriptor::Remote(remote) => remote.oauth().map(|oauth| (oauth, remote.tenant_id.as_deref())),
            LocationDescriptor::Local(_) => None,
        }
    }

    /// Literal location argument handed to the executable
    pub fn to_argument(&self) -> String {
        match self {
            LocationDescriptor::Local(local) => {
                let mut path = local.path.display().to_string();
                if local.directory_wildcard {
                    if !path.ends_with(MAIN_SEPARATOR) {
                        path.push(MAIN_SEPARATOR);
                    }
                    path.push('*');
                }
                path
            }
            LocationDescriptor::Remote(remote) => remote.to_url(),
        }
    }
}

/// Encode each path segment as a URI component.
///
/// `urlencoding` leaves only unreserved characters untouched, so the
/// wildcard `*` (meaningful in the executable's path grammar) always comes
/// out as `%2A`. The same rule escapes `!'()`, which a browser-style
/// component encoder keeps literal; the storage service percent-decodes
/// both spellings to the same blob name.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverwritePolicy {
    True,
    False,
    Prompt,
    IfSourceNewer,
}

impl OverwritePolicy {
    pub fn as_flag_value(self) -> &'static str {
        match self {
            OverwritePolicy::True => "true",
            OverwritePolicy::False => "false",
            OverwritePolicy::Prompt => "prompt",
            OverwritePolicy::IfSourceNewer => "ifSourceNewer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckMd5 {
    NoCheck,
    LogOnly,
    FailIfDifferent,
    FailIfDifferentOrMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FromTo {
    LocalBlob,
    BlobLocal,
    BlobBlob,
    LocalFile,
    FileLocal,
    FileFile,
    BlobFile,
    FileBlob,
    LocalBlobFS,
    BlobFSLocal,
    BlobFSBlobFS,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlobType {
    Detect,
    BlockBlob,
    PageBlob,
    AppendBlob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockBlobTier {
    Hot,
    Cool,
    Cold,
    Archive,
}

macro_rules! display_as_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

display_as_debug!(CheckMd5, FromTo, BlobType, BlockBlobTier);

/// Options for `copy`. Unset options emit no flag.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub overwrite: Option<OverwritePolicy>,
    pub check_md5: Option<CheckMd5>,
    pub from_to: Option<FromTo>,
    pub blob_type: Option<BlobType>,
    pub follow_symlinks: bool,
    pub cap_mbps: Option<f64>,
    pub s2s_preserve_access_tier: Option<bool>,
    pub check_length: Option<bool>,
    pub put_md5: bool,
    pub decompress: bool,
    pub preserve_smb_info: Option<bool>,
    pub preserve_smb_permissions: Option<bool>,
    pub block_blob_tier: Option<BlockBlobTier>,
    pub exclude_paths: Vec<String>,
    /// `None` defers to the command shape: directory wildcards recurse
    pub recursive: Option<bool>,
    pub list_of_files: Option<PathBuf>,
}

/// Options for `remove`
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// `None` defers to the command shape: directory wildcards recurse
    pub recursive: Option<bool>,
    pub list_of_files: Option<PathBuf>,
    /// Delete blob snapshots together with their base blob
    pub delete_snapshots: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(path: &str, credential: RemoteCredential) -> RemoteLocation {
        RemoteLocation::new("https://acct.blob.core.windows.net/", path, credential)
    }

    #[test]
    fn test_asterisk_is_percent_encoded() {
        let location = LocationDescriptor::remote(remote("container/report*.csv", RemoteCredential::Anonymous));
        assert_eq!(
            location.to_argument(),
            "https://acct.blob.core.windows.net/container/report%2A.csv"
        );
    }

    #[test]
    fn test_path_segments_are_component_encoded() {
        let location = remote("container/my dir/a#b?.txt", RemoteCredential::Anonymous);
        assert_eq!(
            location.to_url(),
            "https://acct.blob.core.windows.net/container/my%20dir/a%23b%3F.txt"
        );
    }

    #[test]
    fn test_sub_delims_are_escaped_too() {
        let location = remote("container/it's (final)!.txt", RemoteCredential::Anonymous);
        assert_eq!(
            location.to_url(),
            "https://acct.blob.core.windows.net/container/it%27s%20%28final%29%21.txt"
        );
    }

    #[test]
    fn test_remote_wildcard_sas_and_snapshot() {
        let location = remote("container/dir", RemoteCredential::Sas("?sv=2021&sig=abc%3D".to_string()))
            .with_snapshot("2024-01-01T00:00:00.0000000Z")
            .directory_wildcard();

        assert_eq!(
            location.to_url(),
            "https://acct.blob.core.windows.net/container/dir/*?sv=2021&sig=abc%3D&snapshot=2024-01-01T00%3A00%3A00.0000000Z"
        );
    }

    #[test]
    fn test_oauth_location_has_no_query() {
        let location = remote("container", RemoteCredential::OAuth(OAuthCredential::new("token")))
            .with_tenant("tenant-id");
        assert_eq!(location.to_url(), "https://acct.blob.core.windows.net/container");

        let descriptor = LocationDescriptor::remote(location);
        let (oauth, tenant) = descriptor.oauth().unwrap();
        assert_eq!(oauth.access_token, "token");
        assert_eq!(tenant, Some("tenant-id"));
    }

    #[test]
    fn test_local_wildcard_uses_platform_separator() {
        let base: PathBuf = ["data", "photos"].iter().collect();
        let argument = LocationDescriptor::local_directory(&base).to_argument();

        assert_eq!(argument, format!("{}{}*", base.display(), MAIN_SEPARATOR));
        assert_eq!(LocationDescriptor::local(&base).to_argument(), base.display().to_string());
    }

    #[test]
    fn test_local_wildcard_does_not_double_separator() {
        let path = format!("data{}", MAIN_SEPARATOR);
        let argument = LocationDescriptor::local_directory(&path).to_argument();
        assert_eq!(argument, format!("data{}*", MAIN_SEPARATOR));
    }

    #[test]
    fn test_token_refresher_invokes_callback() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let refresher = TokenRefresher::new(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });

        refresher.refresh().unwrap();
        refresher.clone().refresh().unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
