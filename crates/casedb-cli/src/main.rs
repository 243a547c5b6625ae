use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use casedb_core::model::Content;
use casedb_core::{AddImageProgress, CaseDatabase, CaseDbConfig, HashDatabase, Interval, TimelineFilter};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "casedb", version, about = "casedb - Forensic case database tool")]
struct Cli {
	/// Log debug output
	#[arg(short, long, global = true)]
	verbose: bool,
	/// Config file (defaults to ~/.casedb/config.json)
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Create an empty case database
	New {
		case: PathBuf,
	},
	/// Add a raw disk image to a case
	AddImage {
		case: PathBuf,
		/// Image segments, in order
		#[arg(required = true)]
		paths: Vec<PathBuf>,
		/// Time zone recorded for the data source
		#[arg(long, default_value = "UTC")]
		tz: String,
		/// Device id; defaults to the image name and the current time
		#[arg(long)]
		device_id: Option<String>,
		/// Skip the FAT orphan file search
		#[arg(long)]
		no_fat_orphans: bool,
		/// Hash the image while adding it
		#[arg(long)]
		hash: bool,
	},
	/// Show case details and data sources
	Info {
		case: PathBuf,
		/// Print JSON instead of text
		#[arg(long)]
		json: bool,
	},
	/// List blackboard artifacts
	Artifacts {
		case: PathBuf,
		/// Artifact type name (e.g. TSK_ACCOUNT) or numeric id
		#[arg(long = "type")]
		artifact_type: Option<String>,
	},
	/// List timeline events
	Timeline {
		case: PathBuf,
		/// Only events whose description contains this text
		#[arg(long)]
		text: Option<String>,
		/// First day, YYYY-MM-DD
		#[arg(long)]
		start: Option<String>,
		/// Last day, YYYY-MM-DD
		#[arg(long)]
		end: Option<String>,
	},
	/// List communication and OS accounts
	Accounts {
		case: PathBuf,
	},
	/// List hosts, or add one
	Hosts {
		case: PathBuf,
		#[arg(long)]
		add: Option<String>,
	},
	/// Hex dump the content of an object
	Read {
		case: PathBuf,
		obj_id: i64,
		#[arg(long, default_value = "0")]
		offset: u64,
		#[arg(long, default_value = "256")]
		len: usize,
	},
	/// Look up an MD5 in hash sets
	HashLookup {
		md5: String,
		#[arg(long)]
		nsrl: Option<PathBuf>,
		#[arg(long)]
		known_bad: Option<PathBuf>,
	},
}

#[derive(Serialize)]
struct CaseSummary {
	path: PathBuf,
	uuid: String,
	schema_version: String,
	data_sources: Vec<DataSourceSummary>,
}

#[derive(Serialize)]
struct DataSourceSummary {
	id: i64,
	name: String,
	device_id: String,
	size: u64,
	host: Option<String>,
	md5: Option<String>,
}

/// Emoji prefix on a terminal, nothing when piped
fn icon(emoji: &'static str) -> &'static str {
	if atty::is(atty::Stream::Stdout) {
		emoji
	} else {
		""
	}
}

fn load_config(path: Option<&Path>) -> Result<CaseDbConfig> {
	let path = match path {
		Some(path) => path.to_path_buf(),
		None => CaseDbConfig::default_path()?,
	};
	CaseDbConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn open_case(path: &Path, config: CaseDbConfig) -> Result<CaseDatabase> {
	CaseDatabase::open_case(path, config).with_context(|| format!("Failed to open case {}", path.display()))
}

fn format_time(secs: i64) -> String {
	match Utc.timestamp_opt(secs, 0).single() {
		Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
		None => secs.to_string(),
	}
}

fn parse_day(day: &str) -> Result<i64> {
	let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").with_context(|| format!("Invalid date {}", day))?;
	let midnight = date.and_hms_opt(0, 0, 0).context("Invalid date")?;
	Ok(midnight.and_utc().timestamp())
}

fn hex_dump(offset: u64, data: &[u8]) {
	for (i, chunk) in data.chunks(16).enumerate() {
		let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
		let ascii: String = chunk
			.iter()
			.map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
			.collect();
		println!("{:08x}  {:<47}  |{}|", offset + (i * 16) as u64, hex.join(" "), ascii);
	}
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let default_level = if cli.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
		.init();

	let config = load_config(cli.config.as_deref())?;

	match cli.command {
		Commands::New { case } => {
			let db = CaseDatabase::new_case(&case, config)
				.with_context(|| format!("Failed to create case {}", case.display()))?;
			println!("{}Created case {}", icon("✅ "), case.display());
			println!("{}Case UUID: {}", icon("🆔 "), db.case_uuid()?);
		}
		Commands::AddImage { case, paths, tz, device_id, no_fat_orphans, hash } => {
			let mut config = config;
			config.compute_image_hashes |= hash;
			let db = open_case(&case, config)?;
			let device_id = device_id.unwrap_or_else(|| default_device_id(&paths));

			let bar = ProgressBar::new(0);
			bar.set_style(ProgressStyle::with_template("{spinner} {msg} [{bar:40}] {bytes}/{total_bytes}")?);
			let progress = bar.clone();
			let mut process = db
				.make_add_image_process(&tz, no_fat_orphans, &device_id)
				.with_progress(move |step| match step {
					AddImageProgress::Opening { path } => progress.set_message(format!("Opening {}", path.display())),
					AddImageProgress::Volume { addr, description } => {
						progress.set_message(format!("Volume {}: {}", addr, description))
					}
					AddImageProgress::Hashing { bytes_done, total } => {
						progress.set_message("Hashing");
						progress.set_length(*total);
						progress.set_position(*bytes_done);
					}
					AddImageProgress::Done { .. } => progress.set_message("Done"),
				});

			if let Err(e) = process.run(&paths) {
				bar.abandon_with_message("Failed");
				return Err(e).context("Failed to add image");
			}
			let image_id = process.commit().context("Failed to commit image")?;
			bar.finish_and_clear();

			let image = db.get_image(image_id)?;
			println!("{}Added image {} as object {}", icon("✅ "), image.name, image_id);
			println!("{}Size: {} MB", icon("💾 "), image.size / (1024 * 1024));
			println!("{}Volume systems: {}", icon("📁 "), db.get_volume_systems(image_id)?.len());
			if let Some(md5) = image.md5 {
				println!("{}MD5: {}", icon("🔐 "), md5);
			}
		}
		Commands::Info { case, json } => {
			let db = open_case(&case, config)?;
			let (major, minor) = db.schema_version()?;
			let hosts = db.hosts();
			let mut data_sources = Vec::new();
			for image in db.get_data_sources()? {
				let host = hosts.get_host_for_data_source(image.id).ok().map(|h| h.name);
				data_sources.push(DataSourceSummary {
					id: image.id,
					name: image.name,
					device_id: image.device_id,
					size: image.size,
					host,
					md5: image.md5,
				});
			}
			let summary = CaseSummary {
				path: case,
				uuid: db.case_uuid()?,
				schema_version: format!("{}.{}", major, minor),
				data_sources,
			};

			if json {
				println!("{}", serde_json::to_string_pretty(&summary)?);
			} else {
				println!("{}Case: {}", icon("📋 "), summary.path.display());
				println!("{}UUID: {}", icon("🆔 "), summary.uuid);
				println!("{}Schema: {}", icon("🗂️  "), summary.schema_version);
				println!("{}Data sources: {}", icon("📊 "), summary.data_sources.len());
				for ds in &summary.data_sources {
					println!(
						"   [{}] {} ({} bytes, device {}, host {})",
						ds.id,
						ds.name,
						ds.size,
						ds.device_id,
						ds.host.as_deref().unwrap_or("-")
					);
				}
			}
		}
		Commands::Artifacts { case, artifact_type } => {
			let db = open_case(&case, config)?;
			let blackboard = db.blackboard();
			let types = match artifact_type {
				Some(name) => {
					let found = match name.parse::<i32>() {
						Ok(type_id) => Some(blackboard.get_artifact_type(type_id)?),
						Err(_) => blackboard.get_artifact_type_by_name(&name)?,
					};
					match found {
						Some(t) => vec![t],
						None => bail!("Unknown artifact type {}", name),
					}
				}
				None => blackboard.get_artifact_types()?,
			};

			for artifact_type in types {
				let artifacts = blackboard.get_artifacts(artifact_type.type_id)?;
				if artifacts.is_empty() {
					continue;
				}
				println!("{}{} ({})", icon("📌 "), artifact_type.display_name, artifacts.len());
				for artifact in artifacts {
					println!("   [{}] source {}", artifact.artifact_id, artifact.source_obj_id);
					for attribute in blackboard.get_attributes(artifact.artifact_id)? {
						println!(
							"      {}: {}",
							attribute.attribute_type.display_name,
							attribute.value.display_string()
						);
					}
				}
			}
		}
		Commands::Timeline { case, text, start, end } => {
			let db = open_case(&case, config)?;
			let timeline = db.timeline();
			let start = start.as_deref().map(parse_day).transpose()?.unwrap_or(0);
			let end = match end.as_deref() {
				Some(day) => parse_day(day)? + 86_400,
				None => i64::MAX,
			};
			let interval = Interval::new(start, end)?;
			let filter = text.map(TimelineFilter::Text);

			let ids = timeline.get_event_ids(interval, filter.as_ref())?;
			println!("{}{} events", icon("📅 "), ids.len());
			for id in ids {
				let event = timeline.get_event(id)?;
				let type_name = timeline
					.get_event_type(event.event_type_id)
					.map(|t| t.display_name)
					.unwrap_or_else(|_| event.event_type_id.to_string());
				println!("{}  {:<16} {}", format_time(event.time), type_name, event.description.full);
			}
		}
		Commands::Accounts { case } => {
			let db = open_case(&case, config)?;
			let communications = db.communications();
			for account_type in communications.get_account_types_in_use()? {
				let accounts = communications.get_accounts(&account_type.type_name)?;
				println!("{}{} ({})", icon("👤 "), account_type.display_name, accounts.len());
				for account in accounts {
					println!("   [{}] {}", account.account_id, account.type_specific_id);
				}
			}

			let os_accounts = db.os_accounts();
			for host in db.hosts().get_hosts()? {
				let accounts = os_accounts.get_os_accounts(&host)?;
				if accounts.is_empty() {
					continue;
				}
				println!("{}OS accounts on {}", icon("🖥️  "), host.name);
				for account in accounts {
					println!(
						"   [{}] {} {}",
						account.obj_id,
						account.login_name.as_deref().unwrap_or("-"),
						account.addr.as_deref().unwrap_or("")
					);
				}
			}
		}
		Commands::Hosts { case, add } => {
			let db = open_case(&case, config)?;
			let hosts = db.hosts();
			if let Some(name) = add {
				let host = hosts.new_host(&name)?;
				println!("{}Host {} ({})", icon("✅ "), host.name, host.id);
			}
			for host in hosts.get_hosts()? {
				let sources = hosts.get_data_sources_for_host(host.id)?;
				println!("[{}] {} ({} data sources)", host.id, host.name, sources.len());
			}
		}
		Commands::Read { case, obj_id, offset, len } => {
			let db = open_case(&case, config)?;
			let mut buf = vec![0u8; len];
			let n = match db.get_content(obj_id)? {
				Content::Image(image) => db.read_image(image.id, offset, &mut buf)?,
				Content::Volume(volume) => db.read_volume(volume.id, offset, &mut buf)?,
				Content::FileSystem(fs) => db.read_fs(fs.id, offset, &mut buf)?,
				Content::File(file) => db.read_file(file.id, offset, &mut buf)?,
				other => bail!("Object {} has no readable content ({:?})", obj_id, other),
			};
			hex_dump(offset, &buf[..n]);
		}
		Commands::HashLookup { md5, nsrl, known_bad } => {
			if nsrl.is_none() && known_bad.is_none() {
				bail!("Give --nsrl and/or --known-bad");
			}
			let mut db = HashDatabase::new();
			if let Some(path) = &nsrl {
				let count = db.set_nsrl_database(path).with_context(|| format!("Failed to load {}", path.display()))?;
				println!("{}NSRL: {} hashes", icon("📚 "), count);
			}
			if let Some(path) = &known_bad {
				let count = db
					.set_known_bad_database(path)
					.with_context(|| format!("Failed to load {}", path.display()))?;
				println!("{}Known bad: {} hashes", icon("☠️  "), count);
			}
			println!("{}{}: {}", icon("🔍 "), md5, db.lookup_md5(&md5)?);
		}
	}
	Ok(())
}

/// Device id derived from the first segment name and the current time
fn default_device_id(paths: &[PathBuf]) -> String {
	let stem = paths
		.first()
		.and_then(|p| p.file_stem())
		.map(|s| s.to_string_lossy().to_string())
		.unwrap_or_else(|| "image".to_string());
	format!("{}-{}", stem, Utc::now().timestamp())
}
