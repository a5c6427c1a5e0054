use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use etl_manager::{
    clients::local::LocalObjectStore,
    job::archive::HttpArchiveFetcher,
    read_database_folder, EtlError, GlueJob, JobConfig,
};
use serde_json::{json, Value};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "etl_manager", about = "Catalog table definitions and job packaging")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print native catalog table definitions for a metadata folder
    TableDef {
        meta_dir: PathBuf,
        /// Only this table
        #[arg(long)]
        table: Option<String>,
        /// Overrides the database's own path
        #[arg(long)]
        database_path: Option<String>,
    },
    /// Read a metadata folder and write it back out
    Normalise {
        meta_dir: PathBuf,
        out_dir: PathBuf,
        /// Only write database.json
        #[arg(long)]
        no_tables: bool,
    },
    /// Print the job submission payload and run arguments
    JobDef(JobOpts),
    /// Upload all job resources into a directory-backed object store
    Stage {
        #[command(flatten)]
        job: JobOpts,
        /// Root directory standing in for the object store
        #[arg(long)]
        store_root: PathBuf,
    },
}

#[derive(Args, Debug)]
struct JobOpts {
    job_folder: PathBuf,
    /// YAML job config
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "ETL_BUCKET")]
    bucket: Option<String>,
    #[arg(long, env = "ETL_JOB_ROLE")]
    role: Option<String>,
    #[arg(long)]
    job_name: Option<String>,
    /// Leave out shared_job_resources/
    #[arg(long)]
    no_shared: bool,
}

impl JobOpts {
    fn build_job(&self) -> Result<GlueJob> {
        let mut config = match &self.config {
            Some(path) => JobConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => JobConfig::default(),
        };
        if self.bucket.is_some() {
            config.bucket = self.bucket.clone();
        }
        if self.role.is_some() {
            config.job_role = self.role.clone();
        }
        if self.job_name.is_some() {
            config.job_name = self.job_name.clone();
        }
        if self.no_shared {
            config.include_shared_job_resources = false;
        }
        Ok(config.build_job(&self.job_folder)?)
    }
}

fn table_defs(meta_dir: &Path, table: Option<&str>, database_path: Option<&str>) -> Result<Value> {
    let db = read_database_folder(meta_dir)?;
    let defs = match table {
        Some(name) => db.table(name)?.glue_table_definition(database_path)?,
        None => {
            let mut defs = Vec::new();
            for t in db.tables() {
                defs.push(t.glue_table_definition(database_path)?);
            }
            Value::Array(defs)
        }
    };
    Ok(defs)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::TableDef {
            meta_dir,
            table,
            database_path,
        } => {
            let defs = table_defs(&meta_dir, table.as_deref(), database_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&defs)?);
        }
        Command::Normalise {
            meta_dir,
            out_dir,
            no_tables,
        } => {
            let db = read_database_folder(&meta_dir)?;
            db.write_to_json(&out_dir, !no_tables)?;
            info!(database = %db.name(), out = %out_dir.display(), "normalised");
        }
        Command::JobDef(opts) => {
            let job = opts.build_job()?;
            let submission = job.job_definition()?;
            let out = json!({
                "job": submission.to_payload(),
                "arguments": submission.arguments,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Stage { job, store_root } => {
            let mut glue_job = job.build_job()?;
            let store = LocalObjectStore::new(store_root);
            glue_job.sync_job_to_s3_folder(&store, &HttpArchiveFetcher::default())?;
            println!("{}", glue_job.s3_job_folder());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .downcast_ref::<EtlError>()
                .map_or(1, EtlError::exit_code);
            ExitCode::from(code)
        }
    }
}
