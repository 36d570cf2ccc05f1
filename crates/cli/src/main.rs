use clap::{Args, Parser, Subcommand};
use pretriage_core::{
    spawn_viewer, CoreConfig, CredentialStore, FileRecordStore, IntakeForm, IntakeService,
    PatientRecord, Priority, RecordId, RecordStore, Role, SessionContext, SnapshotFilter, Status,
    SubmitReport, ViewerConfig, ViewerEvent, ViewerSession,
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pretriage")]
#[command(about = "Hospital pre-triage board CLI")]
struct Cli {
    /// Data directory (defaults to $PRETRIAGE_DATA_DIR, then ./pretriage_data)
    #[arg(long, global = true)]
    data_dir: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Login {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a nurse or doctor account
    Register {
        username: String,
        password: String,
        /// Nurse or Doctor
        role: String,
    },
    /// Register a patient (nurse)
    Intake {
        #[command(flatten)]
        login: Login,
        name: String,
        age: u32,
        /// Masculino or Femenino
        sex: String,
        #[arg(long, default_value_t = 0.0)]
        weight_kg: f64,
        #[arg(long, default_value_t = 0.0)]
        height_cm: f64,
        #[arg(long, default_value_t = 0)]
        pulse_bpm: u32,
        #[arg(long, default_value_t = 0)]
        spo2_pct: u32,
        #[arg(long, default_value_t = 0.0)]
        temperature_c: f64,
        /// Systolic/diastolic, e.g. 120/80
        #[arg(long, default_value = "")]
        blood_pressure: String,
        #[arg(long, default_value = "")]
        allergies: String,
        #[arg(long, default_value = "")]
        observations: String,
    },
    /// List records (doctor)
    List {
        #[command(flatten)]
        login: Login,
        /// Case-insensitive name filter
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Keep a live board open, refreshing every $PRETRIAGE_POLL_INTERVAL_SECS (doctor)
    Watch {
        #[command(flatten)]
        login: Login,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Change a record's status (doctor)
    SetStatus {
        #[command(flatten)]
        login: Login,
        id: String,
        status: String,
    },
    /// Change or clear a record's priority (doctor). Use "none" to clear.
    SetPriority {
        #[command(flatten)]
        login: Login,
        id: String,
        priority: String,
    },
}

struct Context {
    cfg: CoreConfig,
    store: Arc<dyn RecordStore>,
    credentials: CredentialStore,
}

impl Context {
    fn open(data_dir: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let cfg = CoreConfig::from_env_values(
            data_dir.or_else(|| std::env::var("PRETRIAGE_DATA_DIR").ok()),
            std::env::var("PRETRIAGE_POLL_INTERVAL_SECS").ok(),
            std::env::var("PRETRIAGE_OP_TIMEOUT_SECS").ok(),
            std::env::var("PRETRIAGE_PRIORITY_SCALE").ok(),
            std::env::var("PRETRIAGE_STATUS_FLOW").ok(),
        )?;
        std::fs::create_dir_all(cfg.data_dir())?;
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::open(cfg.records_path())?);
        let credentials = CredentialStore::open(cfg.users_path())?;
        Ok(Self {
            cfg,
            store,
            credentials,
        })
    }

    fn login(&self, login: &Login) -> Result<SessionContext, Box<dyn std::error::Error>> {
        Ok(self.credentials.login(&login.username, &login.password)?)
    }

    fn viewer(&self, login: &Login) -> Result<ViewerSession, Box<dyn std::error::Error>> {
        let ctx = self.login(login)?;
        Ok(ViewerSession::open(
            ctx,
            self.store.clone(),
            self.cfg.vocabulary(),
        )?)
    }
}

fn print_record(record: &PatientRecord) {
    let priority = record
        .priority
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "ID: {}, Name: {}, Age: {}, Priority: {}, Status: {}, Registered: {}",
        record.id,
        record.intake.name,
        record.intake.age,
        priority,
        record.status,
        record
            .created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
    );
}

fn parse_filter(
    name: Option<String>,
    priority: Option<String>,
    status: Option<String>,
) -> Result<SnapshotFilter, Box<dyn std::error::Error>> {
    Ok(SnapshotFilter {
        name_contains: name,
        priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
        status: status.as_deref().map(str::parse::<Status>).transpose()?,
    })
}

fn print_records(records: &[PatientRecord]) {
    if records.is_empty() {
        println!("No patients found.");
    } else {
        records.iter().for_each(print_record);
    }
}

/// Run a scheduled viewer until Ctrl-C, reprinting the board after every refresh.
async fn watch(
    viewer: ViewerSession,
    config: ViewerConfig,
    filter: SnapshotFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let (handle, mut events) = spawn_viewer(viewer, config);
    print_records(&handle.view(filter.clone()).await?.records);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ViewerEvent::Refreshed(summary)) => {
                    println!(
                        "-- {} records at {}",
                        summary.records,
                        summary.taken_at.with_timezone(&chrono::Local).format("%H:%M:%S")
                    );
                    print_records(&handle.view(filter.clone()).await?.records);
                }
                Some(ViewerEvent::RefreshFailed(err)) => {
                    eprintln!("Refresh failed, showing previous data: {err}");
                }
                Some(ViewerEvent::Submitted(submitted)) => print_submit(&submitted),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.logout().await?;
    Ok(())
}

fn print_submit(submitted: &SubmitReport) {
    let rejections = submitted.rejections();
    if rejections.is_empty() {
        println!("Saved.");
    } else {
        for rejection in rejections {
            eprintln!("Not saved: {rejection}");
        }
    }
    if let Some(err) = &submitted.refresh_error {
        eprintln!("Warning: could not reload records after saving: {err}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'pretriage --help' for commands");
        return Ok(());
    };
    let context = Context::open(cli.data_dir)?;

    match command {
        Commands::Register {
            username,
            password,
            role,
        } => {
            let role: Role = role.parse()?;
            match context.credentials.register(&username, &password, role) {
                Ok(()) => println!("Registered {username} as {role}"),
                Err(e) => eprintln!("Error registering user: {e}"),
            }
        }
        Commands::Intake {
            login,
            name,
            age,
            sex,
            weight_kg,
            height_cm,
            pulse_bpm,
            spo2_pct,
            temperature_c,
            blood_pressure,
            allergies,
            observations,
        } => {
            let ctx = context.login(&login)?;
            let form = IntakeForm {
                name,
                age,
                sex,
                weight_kg,
                height_cm,
                pulse_bpm,
                spo2_pct,
                temperature_c,
                blood_pressure,
                allergies,
                nurse_observations: observations,
                ..Default::default()
            };
            match IntakeService::new(context.store.clone()).register_patient(&ctx, form) {
                Ok(id) => println!("Registered patient with ID: {id}"),
                Err(e) => eprintln!("Error registering patient: {e}"),
            }
        }
        Commands::List {
            login,
            name,
            priority,
            status,
        } => {
            let viewer = context.viewer(&login)?;
            let filter = parse_filter(name, priority, status)?;
            print_records(&viewer.view(&filter));
            viewer.logout();
        }
        Commands::Watch {
            login,
            name,
            priority,
            status,
        } => {
            let filter = parse_filter(name, priority, status)?;
            let viewer = context.viewer(&login)?;
            tokio::runtime::Runtime::new()?.block_on(watch(
                viewer,
                context.cfg.viewer_config(),
                filter,
            ))?;
        }
        Commands::SetStatus { login, id, status } => {
            let mut viewer = context.viewer(&login)?;
            viewer.set_status(id.parse::<RecordId>()?, status.parse::<Status>()?)?;
            print_submit(&viewer.submit());
            viewer.logout();
        }
        Commands::SetPriority {
            login,
            id,
            priority,
        } => {
            let priority = match priority.trim() {
                "" | "-" => None,
                p if p.eq_ignore_ascii_case("none") => None,
                p => Some(p.parse::<Priority>()?),
            };
            let mut viewer = context.viewer(&login)?;
            viewer.set_priority(id.parse::<RecordId>()?, priority)?;
            print_submit(&viewer.submit());
            viewer.logout();
        }
    }

    Ok(())
}
