//! Purpose: Hold top-level CLI command dispatch for `notekeep`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `note` commands behave the same against the local store and a remote server.
//! Invariants: Helpers in `main.rs` remain the source of output formatting.

use super::*;

/// Where `note` commands read and write.
enum NoteBackend {
    Local(Arc<dyn NoteStore>),
    Remote(NotesClient),
}

impl NoteBackend {
    fn from_args(remote: RemoteArgs, db: &DbSelector) -> Result<Self, Error> {
        let Some(url) = remote.url else {
            if remote.tls_ca.is_some() || remote.tls_skip_verify {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("remote TLS flags require --url")
                    .with_hint("Use --tls-ca/--tls-skip-verify only with an https --url."));
            }
            return Ok(NoteBackend::Local(db.open()?));
        };
        let mut client = NotesClient::new(url)?;
        if let Some(path) = remote.tls_ca {
            client = client.with_tls_ca_file(path)?;
        }
        if remote.tls_skip_verify {
            eprintln!("warning: --tls-skip-verify disables TLS certificate verification (unsafe)");
            client = client.with_tls_skip_verify();
        }
        Ok(NoteBackend::Remote(client))
    }

    fn list(&self) -> Result<Vec<Note>, Error> {
        match self {
            NoteBackend::Local(store) => store.list(),
            NoteBackend::Remote(client) => client.list_notes(),
        }
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        match self {
            NoteBackend::Local(store) => store.get(id),
            NoteBackend::Remote(client) => client.get_note(id),
        }
    }

    fn add(&self, text: String) -> Result<Note, Error> {
        match self {
            NoteBackend::Local(store) => store.insert(NewNote::new(text)),
            NoteBackend::Remote(client) => client.create_note(text),
        }
    }

    fn delete(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        match self {
            NoteBackend::Local(store) => store.delete(id),
            NoteBackend::Remote(client) => client.delete_note(id),
        }
    }
}

pub(super) fn dispatch_command(command: Command, db: &DbSelector) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "notekeep", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let connection = if args.seed_demo && db.flag.is_none() {
                ConnectionString::Memory
            } else {
                db.connection()?
            };
            let config = serve_config_from_args(args, connection)?;
            emit_serve_startup_guidance(&config);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Note { command } => match command {
            NoteCommand::List { remote, json } => {
                let backend = NoteBackend::from_args(remote, db)?;
                emit_note_list(&backend.list()?, json);
                Ok(RunOutcome::ok())
            }
            NoteCommand::Get { id, remote } => {
                let id = id.parse::<NoteId>()?;
                let backend = NoteBackend::from_args(remote, db)?;
                let note = backend.get(&id)?.ok_or_else(|| note_not_found(&id))?;
                emit_json(json!(note));
                Ok(RunOutcome::ok())
            }
            NoteCommand::Add { text, remote } => {
                let backend = NoteBackend::from_args(remote, db)?;
                let note = backend.add(text)?;
                emit_json(json!(note));
                Ok(RunOutcome::ok())
            }
            NoteCommand::Delete { id, remote } => {
                let id = id.parse::<NoteId>()?;
                let backend = NoteBackend::from_args(remote, db)?;
                let note = backend.delete(&id)?.ok_or_else(|| note_not_found(&id))?;
                emit_deleted(note);
                Ok(RunOutcome::ok())
            }
        },
        Command::Demo { command } => match command {
            DemoCommand::Gears {
                driver_radius,
                driven_radius,
                max_speed,
                samples,
                torque,
            } => {
                let train = gears::GearTrain::new(driver_radius, driven_radius)?;
                let report = gears::gear_report(train, max_speed, samples, torque)?;
                emit_json(json!(report));
                Ok(RunOutcome::ok())
            }
            DemoCommand::Fatigue {
                samples,
                runs,
                amplitude,
                a,
                m,
            } => {
                let curve = fatigue::SnCurve::new(a, m)?;
                let report = fatigue::fatigue_report(curve, samples, amplitude, runs)?;
                emit_json(json!(report));
                Ok(RunOutcome::ok())
            }
        },
    }
}
