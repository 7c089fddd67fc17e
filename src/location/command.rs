//! Argument vector and display command construction
//!
//! The argument vector is handed to the executable verbatim, never through a
//! shell. The display string is for diagnostics only: it quotes for the
//! chosen shell and brackets bearer tokens with environment export/unset.

use serde::Serialize;

use super::{CopyOptions, DeleteOptions, LocationDescriptor, OAuthCredential};
use crate::constants::{
    CANCEL_FROM_STDIN_FLAG, CRED_TYPE_OAUTH, ENV_CRED_TYPE, ENV_OAUTH_TOKEN_INFO, OUTPUT_TYPE_FLAG,
};
use crate::models::JobKind;

const REDACTED: &str = "REDACTED";

/// Shell dialect used for the display string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    Posix,
    PowerShell,
    Cmd,
}

impl ShellFlavor {
    pub fn native() -> Self {
        if cfg!(windows) {
            ShellFlavor::PowerShell
        } else {
            ShellFlavor::Posix
        }
    }
}

/// Token info document read by the executable from its environment
#[derive(Serialize)]
struct OAuthTokenInfo<'a> {
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_on: Option<String>,
    token_type: &'static str,
    #[serde(rename = "_tenant", skip_serializing_if = "Option::is_none")]
    tenant: Option<&'a str>,
}

/// Fully serialized invocation of the transfer executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Sensitive variables that must be set for the subprocess only
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    /// `<program> copy <src> <dst> --output-type=json --cancel-from-stdin [options]`
    pub fn copy(
        program: impl Into<String>,
        source: &LocationDescriptor,
        destination: &LocationDescriptor,
        options: &CopyOptions,
    ) -> Self {
        let mut args = Self::preamble(JobKind::Copy, &[source, destination]);

        if let Some(overwrite) = options.overwrite {
            args.push(format!("--overwrite={}", overwrite.as_flag_value()));
        }
        if let Some(check_md5) = options.check_md5 {
            args.push(format!("--check-md5={}", check_md5));
        }
        if let Some(from_to) = options.from_to {
            args.push(format!("--from-to={}", from_to));
        }
        if let Some(blob_type) = options.blob_type {
            args.push(format!("--blob-type={}", blob_type));
        }
        if options.follow_symlinks {
            args.push("--follow-symlinks".to_string());
        }
        if let Some(cap) = options.cap_mbps {
            args.push(format!("--cap-mbps={}", cap));
        }
        if let Some(preserve) = options.s2s_preserve_access_tier {
            args.push(format!("--s2s-preserve-access-tier={}", preserve));
        }
        if let Some(check) = options.check_length {
            args.push(format!("--check-length={}", check));
        }
        if options.put_md5 {
            args.push("--put-md5".to_string());
        }
        if options.decompress {
            args.push("--decompress".to_string());
        }
        if let Some(preserve) = options.preserve_smb_info {
            args.push(format!("--preserve-smb-info={}", preserve));
        }
        if let Some(preserve) = options.preserve_smb_permissions {
            args.push(format!("--preserve-smb-permissions={}", preserve));
        }
        if let Some(tier) = options.block_blob_tier {
            args.push(format!("--block-blob-tier={}", tier));
        }
        if !options.exclude_paths.is_empty() {
            args.push(format!("--exclude-path={}", options.exclude_paths.join(";")));
        }
        let wildcard = source.is_directory_wildcard() || destination.is_directory_wildcard();
        if options.recursive.unwrap_or(wildcard) {
            args.push("--recursive".to_string());
        }
        if let Some(list) = &options.list_of_files {
            args.push(format!("--list-of-files={}", list.display()));
        }

        Self {
            program: program.into(),
            args,
            env: Self::credential_env(&[source, destination]),
        }
    }

    /// `<program> remove <target> --output-type=json --cancel-from-stdin [options]`
    pub fn remove(program: impl Into<String>, target: &LocationDescriptor, options: &DeleteOptions) -> Self {
        let mut args = Self::preamble(JobKind::Remove, &[target]);

        if options.delete_snapshots {
            args.push("--delete-snapshots=include".to_string());
        }
        if options.recursive.unwrap_or(target.is_directory_wildcard()) {
            args.push("--recursive".to_string());
        }
        if let Some(list) = &options.list_of_files {
            args.push(format!("--list-of-files={}", list.display()));
        }

        Self {
            program: program.into(),
            args,
            env: Self::credential_env(&[target]),
        }
    }

    fn preamble(kind: JobKind, locations: &[&LocationDescriptor]) -> Vec<String> {
        let mut args = vec![kind.subcommand().to_string()];
        args.extend(locations.iter().map(|location| location.to_argument()));
        args.push(OUTPUT_TYPE_FLAG.to_string());
        args.push(CANCEL_FROM_STDIN_FLAG.to_string());
        args
    }

    /// Bearer tokens travel through the environment; the first OAuth location wins
    fn credential_env(locations: &[&LocationDescriptor]) -> Vec<(String, String)> {
        let Some((oauth, tenant)) = locations.iter().find_map(|location| location.oauth()) else {
            return Vec::new();
        };

        vec![
            (ENV_CRED_TYPE.to_string(), CRED_TYPE_OAUTH.to_string()),
            (ENV_OAUTH_TOKEN_INFO.to_string(), token_info_json(oauth, tenant)),
        ]
    }

    /// Human-readable, copy-pasteable rendering of the invocation
    pub fn display(&self, shell: ShellFlavor, redact: bool) -> String {
        let env: Vec<(&str, String)> = self
            .env
            .iter()
            .map(|(name, value)| {
                let value = if redact && name == ENV_OAUTH_TOKEN_INFO {
                    REDACTED.to_string()
                } else {
                    value.clone()
                };
                (name.as_str(), value)
            })
            .collect();

        let mut invocation = vec![program_word(&self.program, shell)];
        invocation.extend(self.args.iter().map(|arg| {
            let arg = if redact { redact_signature(arg) } else { arg.clone() };
            quote(&arg, shell)
        }));
        let invocation = invocation.join(" ");

        let mut lines = Vec::new();
        for (name, value) in &env {
            lines.push(match shell {
                ShellFlavor::Posix => format!("export {}={};", name, quote(value, shell)),
                ShellFlavor::PowerShell => format!("$env:{}={};", name, quote(value, shell)),
                ShellFlavor::Cmd => format!("set \"{}={}\"", name, value),
            });
        }
        lines.push(match shell {
            ShellFlavor::Cmd => invocation,
            _ => format!("{};", invocation),
        });
        for (name, _) in &env {
            lines.push(match shell {
                ShellFlavor::Posix => format!("unset {};", name),
                ShellFlavor::PowerShell => format!("Remove-Item Env:{};", name),
                ShellFlavor::Cmd => format!("set {}=", name),
            });
        }

        lines.join("\n")
    }
}

fn token_info_json(oauth: &OAuthCredential, tenant: Option<&str>) -> String {
    let info = OAuthTokenInfo {
        access_token: &oauth.access_token,
        refresh_token: oauth.refresh_token.as_deref(),
        expires_on: oauth.expires_on.map(|seconds| seconds.to_string()),
        token_type: "Bearer",
        tenant,
    };
    // Serializing a struct of strings cannot fail
    serde_json::to_string(&info).unwrap_or_default()
}

fn program_word(program: &str, shell: ShellFlavor) -> String {
    let quoted = quote(program, shell);
    if shell == ShellFlavor::PowerShell && quoted != program {
        format!("& {}", quoted)
    } else {
        quoted
    }
}

fn is_plain(arg: &str) -> bool {
    !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ',' | '@' | '+'))
}

fn quote(arg: &str, shell: ShellFlavor) -> String {
    if is_plain(arg) {
        return arg.to_string();
    }
    match shell {
        ShellFlavor::Posix => format!("'{}'", arg.replace('\'', r"'\''")),
        ShellFlavor::PowerShell => format!("'{}'", arg.replace('\'', "''")),
        ShellFlavor::Cmd => format!("\"{}\"", arg.replace('"', "\"\"")),
    }
}

/// Replace the value of a SAS `sig` parameter
fn redact_signature(arg: &str) -> String {
    let Some((base, query)) = arg.split_once('?') else {
        return arg.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| {
            if pair.starts_with("sig=") {
                format!("sig={}", REDACTED)
            } else {
                pair.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", base, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{
        BlobType, BlockBlobTier, CheckMd5, FromTo, OverwritePolicy, RemoteCredential, RemoteLocation,
    };
    use std::path::PathBuf;

    fn sas_remote(path: &str) -> LocationDescriptor {
        LocationDescriptor::remote(RemoteLocation::new(
            "https://acct.blob.core.windows.net",
            path,
            RemoteCredential::Sas("sv=2021&sig=secret".to_string()),
        ))
    }

    #[test]
    fn test_copy_without_options_emits_only_protocol_flags() {
        let command = CommandLine::copy(
            "azcopy",
            &LocationDescriptor::local("/data/a.txt"),
            &sas_remote("container/a.txt"),
            &CopyOptions::default(),
        );

        assert_eq!(command.program, "azcopy");
        assert_eq!(
            command.args,
            vec![
                "copy",
                "/data/a.txt",
                "https://acct.blob.core.windows.net/container/a.txt?sv=2021&sig=secret",
                "--output-type=json",
                "--cancel-from-stdin",
            ]
        );
        assert!(command.env.is_empty());
    }

    #[test]
    fn test_copy_with_every_option() {
        let options = CopyOptions {
            overwrite: Some(OverwritePolicy::Prompt),
            check_md5: Some(CheckMd5::FailIfDifferent),
            from_to: Some(FromTo::LocalBlob),
            blob_type: Some(BlobType::BlockBlob),
            follow_symlinks: true,
            cap_mbps: Some(100.0),
            s2s_preserve_access_tier: Some(false),
            check_length: Some(true),
            put_md5: true,
            decompress: true,
            preserve_smb_info: Some(true),
            preserve_smb_permissions: Some(false),
            block_blob_tier: Some(BlockBlobTier::Cool),
            exclude_paths: vec!["tmp".to_string(), "cache/old".to_string()],
            recursive: Some(true),
            list_of_files: Some(PathBuf::from("/tmp/list.txt")),
        };
        let command = CommandLine::copy(
            "azcopy",
            &LocationDescriptor::local("/data"),
            &sas_remote("container"),
            &options,
        );

        assert_eq!(
            &command.args[4..],
            &[
                "--cancel-from-stdin",
                "--overwrite=prompt",
                "--check-md5=FailIfDifferent",
                "--from-to=LocalBlob",
                "--blob-type=BlockBlob",
                "--follow-symlinks",
                "--cap-mbps=100",
                "--s2s-preserve-access-tier=false",
                "--check-length=true",
                "--put-md5",
                "--decompress",
                "--preserve-smb-info=true",
                "--preserve-smb-permissions=false",
                "--block-blob-tier=Cool",
                "--exclude-path=tmp;cache/old",
                "--recursive",
                "--list-of-files=/tmp/list.txt",
            ]
        );
    }

    #[test]
    fn test_directory_wildcard_defaults_to_recursive() {
        let source = LocationDescriptor::local_directory("/data");
        let command = CommandLine::copy("azcopy", &source, &sas_remote("container"), &CopyOptions::default());
        assert!(command.args.contains(&"--recursive".to_string()));

        let options = CopyOptions {
            recursive: Some(false),
            ..Default::default()
        };
        let command = CommandLine::copy("azcopy", &source, &sas_remote("container"), &options);
        assert!(!command.args.contains(&"--recursive".to_string()));
    }

    #[test]
    fn test_remove_arguments() {
        let options = DeleteOptions {
            recursive: None,
            list_of_files: None,
            delete_snapshots: true,
        };
        let command = CommandLine::remove("azcopy", &sas_remote("container/blob*"), &options);

        assert_eq!(
            command.args,
            vec![
                "remove",
                "https://acct.blob.core.windows.net/container/blob%2A?sv=2021&sig=secret",
                "--output-type=json",
                "--cancel-from-stdin",
                "--delete-snapshots=include",
            ]
        );
        assert!(!command.args.iter().any(|arg| arg.starts_with("--from-to")));
    }

    #[test]
    fn test_oauth_token_goes_to_environment() {
        let oauth = crate::location::OAuthCredential::new("access")
            .with_refresh_token("refresh")
            .with_expiry(1_700_000_000);
        let target = LocationDescriptor::remote(
            RemoteLocation::new("https://acct.blob.core.windows.net", "container", RemoteCredential::OAuth(oauth))
                .with_tenant("contoso"),
        );
        let command = CommandLine::remove("azcopy", &target, &DeleteOptions::default());

        assert!(command.args.iter().all(|arg| !arg.contains("access")));
        assert_eq!(command.env[0], (ENV_CRED_TYPE.to_string(), CRED_TYPE_OAUTH.to_string()));

        let info: serde_json::Value = serde_json::from_str(&command.env[1].1).unwrap();
        assert_eq!(info["access_token"], "access");
        assert_eq!(info["refresh_token"], "refresh");
        assert_eq!(info["expires_on"], "1700000000");
        assert_eq!(info["_tenant"], "contoso");
    }

    #[test]
    fn test_posix_display_brackets_token_and_quotes() {
        let oauth = crate::location::OAuthCredential::new("tok");
        let target = LocationDescriptor::remote(RemoteLocation::new(
            "https://acct.blob.core.windows.net",
            "container",
            RemoteCredential::OAuth(oauth),
        ));
        let source = LocationDescriptor::local("/my data/it's.txt");
        let command = CommandLine::copy("azcopy", &source, &target, &CopyOptions::default());

        let display = command.display(ShellFlavor::Posix, false);
        let lines: Vec<&str> = display.lines().collect();

        assert_eq!(lines[0], "export AZCOPY_CRED_TYPE=OAuthToken;");
        assert!(lines[1].starts_with("export AZCOPY_OAUTH_TOKEN_INFO='{"));
        assert!(lines[2].starts_with("azcopy copy '/my data/it'\\''s.txt' https://acct.blob.core.windows.net/container"));
        assert_eq!(lines[3], "unset AZCOPY_CRED_TYPE;");
        assert_eq!(lines[4], "unset AZCOPY_OAUTH_TOKEN_INFO;");

        let redacted = command.display(ShellFlavor::Posix, true);
        assert!(redacted.contains("export AZCOPY_OAUTH_TOKEN_INFO=REDACTED;"));
        assert!(!redacted.contains("tok\""));
    }

    #[test]
    fn test_display_redacts_sas_signature() {
        let command = CommandLine::remove("azcopy", &sas_remote("container"), &DeleteOptions::default());

        let display = command.display(ShellFlavor::Posix, true);
        assert!(display.contains("sig=REDACTED"));
        assert!(!display.contains("secret"));

        let display = command.display(ShellFlavor::Posix, false);
        assert!(display.contains("'https://acct.blob.core.windows.net/container?sv=2021&sig=secret'"));
    }

    #[test]
    fn test_powershell_and_cmd_display() {
        let source = LocationDescriptor::local(r"C:\My Files\a.txt");
        let command = CommandLine::copy(
            r"C:\Program Files\azcopy.exe",
            &source,
            &sas_remote("container"),
            &CopyOptions::default(),
        );

        let powershell = command.display(ShellFlavor::PowerShell, true);
        assert!(powershell.starts_with(r"& 'C:\Program Files\azcopy.exe' copy 'C:\My Files\a.txt'"));
        assert!(powershell.ends_with(';'));

        let cmd = command.display(ShellFlavor::Cmd, true);
        assert!(cmd.starts_with(r#""C:\Program Files\azcopy.exe" copy "C:\My Files\a.txt""#));
    }
}
