//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - `copy` and `remove` subcommands with their transfer options
//! - Location parsing (local paths, remote URLs with SAS or bearer token)
//! - Output selection (human/JSON), quiet mode and log level

use anyhow::{anyhow, bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;
use std::ffi::OsString;
use std::path::{PathBuf, MAIN_SEPARATOR};

use azjobs::location::{
    BlobType, BlockBlobTier, CheckMd5, CopyOptions, DeleteOptions, FromTo, LocationDescriptor, OAuthCredential,
    OverwritePolicy, RemoteCredential, RemoteLocation,
};

/// Bearer token used for remote locations that carry no SAS
pub const ACCESS_TOKEN_ENV: &str = "AZJOBS_ACCESS_TOKEN";
pub const TENANT_ID_ENV: &str = "AZJOBS_TENANT_ID";

const OVERWRITE_VALUES: &[(&str, OverwritePolicy)] = &[
    ("true", OverwritePolicy::True),
    ("false", OverwritePolicy::False),
    ("prompt", OverwritePolicy::Prompt),
    ("ifSourceNewer", OverwritePolicy::IfSourceNewer),
];

const CHECK_MD5_VALUES: &[(&str, CheckMd5)] = &[
    ("NoCheck", CheckMd5::NoCheck),
    ("LogOnly", CheckMd5::LogOnly),
    ("FailIfDifferent", CheckMd5::FailIfDifferent),
    ("FailIfDifferentOrMissing", CheckMd5::FailIfDifferentOrMissing),
];

const FROM_TO_VALUES: &[(&str, FromTo)] = &[
    ("LocalBlob", FromTo::LocalBlob),
    ("BlobLocal", FromTo::BlobLocal),
    ("BlobBlob", FromTo::BlobBlob),
    ("LocalFile", FromTo::LocalFile),
    ("FileLocal", FromTo::FileLocal),
    ("FileFile", FromTo::FileFile),
    ("BlobFile", FromTo::BlobFile),
    ("FileBlob", FromTo::FileBlob),
    ("LocalBlobFS", FromTo::LocalBlobFS),
    ("BlobFSLocal", FromTo::BlobFSLocal),
    ("BlobFSBlobFS", FromTo::BlobFSBlobFS),
];

const BLOB_TYPE_VALUES: &[(&str, BlobType)] = &[
    ("Detect", BlobType::Detect),
    ("BlockBlob", BlobType::BlockBlob),
    ("PageBlob", BlobType::PageBlob),
    ("AppendBlob", BlobType::AppendBlob),
];

const BLOCK_BLOB_TIER_VALUES: &[(&str, BlockBlobTier)] = &[
    ("Hot", BlockBlobTier::Hot),
    ("Cool", BlockBlobTier::Cool),
    ("Cold", BlockBlobTier::Cold),
    ("Archive", BlockBlobTier::Archive),
];

#[derive(Debug, Clone)]
pub enum CliCommand {
    Copy {
        source: LocationDescriptor,
        destination: LocationDescriptor,
        options: CopyOptions,
    },
    Remove {
        target: LocationDescriptor,
        options: DeleteOptions,
    },
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub command: CliCommand,
    pub config_path: Option<PathBuf>,
    /// Overrides the executable from the configuration file
    pub azcopy: Option<PathBuf>,
    pub json_output: bool,
    pub quiet_mode: bool,
    pub print_command: bool,
    pub log_level: LevelFilter,
}

/// Credentials picked up from the environment for remote locations
#[derive(Debug, Clone, Default)]
pub struct CredentialEnv {
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
}

impl CredentialEnv {
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            access_token: non_empty(ACCESS_TOKEN_ENV),
            tenant_id: non_empty(TENANT_ID_ENV),
        }
    }
}

/// Parse command line arguments and return configuration
pub fn parse_args() -> Result<CliConfig> {
    let matches = build_command().get_matches();
    config_from_matches(&matches, &CredentialEnv::from_env())
}

/// Parse an explicit argument list; usage errors are returned instead of exiting
pub fn parse_from<I, T>(args: I, credentials: &CredentialEnv) -> Result<CliConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().try_get_matches_from(args)?;
    config_from_matches(&matches, credentials)
}

pub fn build_command() -> Command {
    let version: &'static str = concat!(env!("AZJOBS_VERSION"), " (", env!("GIT_HASH"), ")");

    Command::new("azjobs")
        .version(env!("AZJOBS_VERSION"))
        .long_version(version)
        .about("Run and monitor AzCopy transfer jobs")
        .long_about(
            "Launches the AzCopy executable for copy and remove operations, follows its JSON progress \
             stream, and reports the final outcome. Remote locations are http(s) URLs; a SAS may be given \
             as the URL query string, otherwise a bearer token is read from AZJOBS_ACCESS_TOKEN.",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("azcopy")
                .long("azcopy")
                .value_name("PATH")
                .help("Path to the AzCopy executable")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output the final result in JSON format")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress progress output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("print-command")
                .long("print-command")
                .help("Print the equivalent AzCopy command line and exit")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log verbosity")
                .value_parser(["off", "error", "warn", "info", "debug", "trace"])
                .default_value("warn")
                .global(true),
        )
        .subcommand(copy_command())
        .subcommand(remove_command())
}

fn copy_command() -> Command {
    Command::new("copy")
        .about("Copy files between local paths and remote storage")
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Source location: local path or http(s) URL; a trailing /* copies a directory's contents")
                .required(true),
        )
        .arg(
            Arg::new("destination")
                .value_name("DESTINATION")
                .help("Destination location: local path or http(s) URL")
                .required(true),
        )
        .arg(choice_arg("overwrite", "POLICY", "Overwrite conflicting files at the destination", OVERWRITE_VALUES))
        .arg(choice_arg("check-md5", "MODE", "Validate MD5 hashes on download", CHECK_MD5_VALUES))
        .arg(choice_arg("from-to", "PAIR", "Source/destination type combination", FROM_TO_VALUES))
        .arg(choice_arg("blob-type", "TYPE", "Blob type at the destination", BLOB_TYPE_VALUES))
        .arg(choice_arg("block-blob-tier", "TIER", "Access tier for uploaded block blobs", BLOCK_BLOB_TIER_VALUES))
        .arg(flag("follow-symlinks", "Follow symbolic links when uploading from the local file system"))
        .arg(
            Arg::new("cap-mbps")
                .long("cap-mbps")
                .value_name("MBPS")
                .help("Cap the transfer rate in megabits per second")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(bool_arg("s2s-preserve-access-tier", "Preserve the access tier on service-to-service copies"))
        .arg(bool_arg("check-length", "Check destination length after transfer"))
        .arg(flag("put-md5", "Store an MD5 hash of each uploaded file"))
        .arg(flag("decompress", "Decompress gzip/deflate files on download"))
        .arg(bool_arg("preserve-smb-info", "Preserve SMB property info"))
        .arg(bool_arg("preserve-smb-permissions", "Preserve SMB ACLs"))
        .arg(
            Arg::new("exclude-path")
                .long("exclude-path")
                .value_name("PATH")
                .help("Exclude a relative path (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(recursive_arg())
        .arg(list_of_files_arg())
}

fn remove_command() -> Command {
    Command::new("remove")
        .about("Delete remote blobs, files or directories")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Location to delete; a trailing /* deletes a directory's contents")
                .required(true),
        )
        .arg(flag("delete-snapshots", "Also delete blob snapshots"))
        .arg(recursive_arg())
        .arg(list_of_files_arg())
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help).action(ArgAction::SetTrue)
}

fn bool_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("BOOL")
        .help(help)
        .value_parser(clap::value_parser!(bool))
}

fn choice_arg<T>(
    name: &'static str,
    value_name: &'static str,
    help: &'static str,
    values: &'static [(&'static str, T)],
) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .help(help)
        .ignore_case(true)
        .value_parser(clap::builder::PossibleValuesParser::new(values.iter().map(|(value, _)| *value)))
}

fn recursive_arg() -> Arg {
    Arg::new("recursive")
        .short('r')
        .long("recursive")
        .value_name("BOOL")
        .help("Recurse into directories (defaults to true for /* locations)")
        .num_args(0..=1)
        .default_missing_value("true")
        .value_parser(clap::value_parser!(bool))
}

fn list_of_files_arg() -> Arg {
    Arg::new("list-of-files")
        .long("list-of-files")
        .value_name("FILE")
        .help("File listing the paths to transfer, one per line")
        .value_parser(clap::value_parser!(PathBuf))
}

fn config_from_matches(matches: &ArgMatches, credentials: &CredentialEnv) -> Result<CliConfig> {
    let command = match matches.subcommand() {
        Some(("copy", sub)) => {
            let source = parse_location(required(sub, "source")?, credentials).context("Invalid source location")?;
            let destination =
                parse_location(required(sub, "destination")?, credentials).context("Invalid destination location")?;
            CliCommand::Copy {
                source,
                destination,
                options: copy_options(sub)?,
            }
        }
        Some(("remove", sub)) => {
            let target = parse_location(required(sub, "target")?, credentials).context("Invalid target location")?;
            CliCommand::Remove {
                target,
                options: DeleteOptions {
                    recursive: sub.get_one::<bool>("recursive").copied(),
                    list_of_files: sub.get_one::<PathBuf>("list-of-files").cloned(),
                    delete_snapshots: sub.get_flag("delete-snapshots"),
                },
            }
        }
        _ => bail!("A subcommand is required (copy or remove)"),
    };

    let log_level = matches
        .get_one::<String>("log-level")
        .map(|level| level.parse::<LevelFilter>())
        .transpose()
        .map_err(|e| anyhow!("Invalid log level: {}", e))?
        .unwrap_or(LevelFilter::Warn);

    Ok(CliConfig {
        command,
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        azcopy: matches.get_one::<PathBuf>("azcopy").cloned(),
        json_output: matches.get_flag("json"),
        quiet_mode: matches.get_flag("quiet"),
        print_command: matches.get_flag("print-command"),
        log_level,
    })
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing required argument: {}", name))
}

fn copy_options(matches: &ArgMatches) -> Result<CopyOptions> {
    Ok(CopyOptions {
        overwrite: choice(matches, "overwrite", OVERWRITE_VALUES)?,
        check_md5: choice(matches, "check-md5", CHECK_MD5_VALUES)?,
        from_to: choice(matches, "from-to", FROM_TO_VALUES)?,
        blob_type: choice(matches, "blob-type", BLOB_TYPE_VALUES)?,
        follow_symlinks: matches.get_flag("follow-symlinks"),
        cap_mbps: matches.get_one::<f64>("cap-mbps").copied(),
        s2s_preserve_access_tier: matches.get_one::<bool>("s2s-preserve-access-tier").copied(),
        check_length: matches.get_one::<bool>("check-length").copied(),
        put_md5: matches.get_flag("put-md5"),
        decompress: matches.get_flag("decompress"),
        preserve_smb_info: matches.get_one::<bool>("preserve-smb-info").copied(),
        preserve_smb_permissions: matches.get_one::<bool>("preserve-smb-permissions").copied(),
        block_blob_tier: choice(matches, "block-blob-tier", BLOCK_BLOB_TIER_VALUES)?,
        exclude_paths: matches
            .get_many::<String>("exclude-path")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        recursive: matches.get_one::<bool>("recursive").copied(),
        list_of_files: matches.get_one::<PathBuf>("list-of-files").cloned(),
    })
}

fn choice<T: Copy>(matches: &ArgMatches, name: &str, values: &[(&str, T)]) -> Result<Option<T>> {
    let Some(value) = matches.get_one::<String>(name) else {
        return Ok(None);
    };
    values
        .iter()
        .find(|(choice, _)| choice.eq_ignore_ascii_case(value))
        .map(|(_, choice)| Some(*choice))
        .ok_or_else(|| anyhow!("Unsupported value for --{}: {}", name, value))
}

/// Turn a command-line location into a descriptor.
///
/// `http(s)://` arguments are remote; the query string is kept as the SAS,
/// except `snapshot=` which is tracked separately. A trailing `/*` (or the
/// platform separator followed by `*`) selects a directory's contents.
pub fn parse_location(raw: &str, credentials: &CredentialEnv) -> Result<LocationDescriptor> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("Location must not be empty");
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        return parse_remote(raw, credentials).map(LocationDescriptor::remote);
    }

    let wildcard_suffix = ['/', MAIN_SEPARATOR]
        .iter()
        .map(|separator| format!("{}*", separator))
        .find(|suffix| raw.ends_with(suffix.as_str()));
    match wildcard_suffix {
        Some(suffix) => {
            let directory = &raw[..raw.len() - suffix.len()];
            let directory = if directory.is_empty() { "/" } else { directory };
            Ok(LocationDescriptor::local_directory(directory))
        }
        None => Ok(LocationDescriptor::local(raw)),
    }
}

fn parse_remote(raw: &str, credentials: &CredentialEnv) -> Result<RemoteLocation> {
    let (address, query) = match raw.split_once('?') {
        Some((address, query)) => (address, query),
        None => (raw, ""),
    };

    let scheme_end = address.find("://").map(|index| index + 3).unwrap_or(0);
    let (account_url, path) = match address[scheme_end..].find('/') {
        Some(index) => address.split_at(scheme_end + index),
        None => (address, ""),
    };
    if account_url.len() <= scheme_end {
        bail!("Remote location has no host: {}", raw);
    }

    let mut path = path.trim_start_matches('/');
    let directory_wildcard = path == "*" || path.ends_with("/*");
    if directory_wildcard {
        path = path.trim_end_matches('*').trim_end_matches('/');
    }
    let path = urlencoding::decode(path)
        .with_context(|| format!("Remote path is not valid UTF-8 after decoding: {}", path))?
        .into_owned();

    let mut snapshot = None;
    let mut sas = Vec::new();
    for parameter in query.split('&').filter(|parameter| !parameter.is_empty()) {
        match parameter.split_once('=') {
            Some(("snapshot", value)) => {
                snapshot = Some(urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_else(|_| value.to_string()));
            }
            _ => sas.push(parameter),
        }
    }

    let credential = if !sas.is_empty() {
        RemoteCredential::Sas(sas.join("&"))
    } else if let Some(token) = &credentials.access_token {
        RemoteCredential::OAuth(OAuthCredential::new(token.clone()))
    } else {
        RemoteCredential::Anonymous
    };
    let is_oauth = matches!(credential, RemoteCredential::OAuth(_));

    let mut location = RemoteLocation::new(account_url, path, credential);
    if let Some(snapshot) = snapshot {
        location = location.with_snapshot(snapshot);
    }
    if directory_wildcard {
        location = location.directory_wildcard();
    }
    if is_oauth {
        if let Some(tenant) = &credentials.tenant_id {
            location = location.with_tenant(tenant.clone());
        }
    }
    Ok(location)
}
