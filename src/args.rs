use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use crate::backend::{self, Backend, Credentials};
use crate::config::{self, FileConfig};
use crate::prompt::{self, Prompt};
use crate::sheet;
use crate::trimester;

/// Options every tool shares.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The user for login. Without this option, the program will
    /// prompt for login info.
    #[arg(short, long)]
    pub user: Option<String>,

    /// The password for login. Without this option, the program will
    /// prompt for login info.
    #[arg(short, long)]
    pub password: Option<String>,

    /// The login url of the website to connect to. If not provided,
    /// will look for a config file containing the login url, or will
    /// prompt for it.
    #[arg(long)]
    pub login_url: Option<String>,

    /// Command line interface (launch without graphical dialogs).
    #[arg(short, long)]
    pub cli: bool,
}

/// Options shared by the upload tools.
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Trimester. Must be 1, 2 or 3. Default is to guess from the csv
    /// file name.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub trimester: Option<u8>,

    /// The name of the group (or class) of students for the
    /// evaluation. Default is to guess from the csv file content (top
    /// left cell).
    #[arg(short, long = "group", value_name = "GROUP")]
    pub group_name: Option<String>,

    /// Do not upload anything to the website.
    #[arg(short = 'd', long)]
    pub dry_run: bool,
}

/// Everything resolved before talking to a backend.
pub struct Session {
    pub ui: Box<dyn Prompt>,
    pub config: FileConfig,
    pub login_url: String,
}

/// Layers config under the arguments and settles the login url, asking
/// for it on first run and writing it back to the user config.
pub fn resolve(common: &CommonArgs) -> Result<Session> {
    let config = config::load_layered();
    let cli = common.cli || config.cli.unwrap_or(false);
    let ui = prompt::ui(cli);
    let config_has_url = config.login_url.is_some();
    let login_url = match common.login_url.clone().or_else(|| config.login_url.clone()) {
        Some(url) => url,
        None => {
            let typed = ui.text(
                "No url provided. Please type the url you use to login on the website,\n\
                 for example \"https://exemple.la-vie-scolaire.fr/login\" or\n\
                 \"https://0123456a.index-education.net/pronote/professeur.html\"",
            )?;
            if typed.trim().is_empty() {
                bail!("empty url provided, aborting");
            }
            typed
        }
    };
    let login_url = login_url.trim_matches(|c| c == ' ' || c == '/').to_string();
    if !login_url.starts_with("https://") {
        bail!("incorrect url provided, aborting");
    }
    println!("Using login url {}", login_url);
    if !config_has_url {
        println!("Writing login url to config file");
        if let Err(e) = config::remember_login_url(&login_url) {
            println!("Warning: error writing config file:\n  {}", e);
        }
    }
    Ok(Session { ui, config, login_url })
}

/// Opens the backend session, prompting for whatever credential is
/// still missing.
pub fn open_backend(session: &Session, common: &CommonArgs) -> Result<Box<dyn Backend>> {
    let user = match common.user.clone().or_else(|| session.config.user.clone()) {
        Some(u) => u,
        None => session.ui.text("Username:")?,
    };
    let password = match common.password.clone().or_else(|| session.config.password.clone()) {
        Some(p) => p,
        None => session.ui.password("Password:")?,
    };
    backend::connect(&session.login_url, &Credentials { user, password })
}

/// The csv path from the arguments, or discovered in the working
/// directory.
pub fn resolve_csv(
    session: &Session,
    explicit: Option<PathBuf>,
    label_pattern: &str,
    prompt_if_notfound: bool,
    silent: bool,
    confirm: bool,
    required: bool,
) -> Result<Option<PathBuf>> {
    let found = match explicit {
        Some(path) => Some(path),
        None => sheet::find_csv_file(
            session.ui.as_ref(),
            label_pattern,
            prompt_if_notfound,
            silent,
            confirm,
        )?,
    };
    if required && found.is_none() {
        bail!("unable to find or guess CSV file");
    }
    Ok(found)
}

/// The group name from the arguments or the csv top-left cell.
pub fn resolve_group_name(explicit: Option<String>, rows: Option<&[Vec<String>]>) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name);
    }
    let rows = match rows {
        Some(r) => r,
        None => bail!("no group name provided (use the -g option)"),
    };
    let name = sheet::group_name(rows)?;
    println!("Using group name from csv: {}", name);
    Ok(name)
}

/// The trimester from the arguments or the csv file name.
pub fn resolve_trimester(
    explicit: Option<u8>,
    csv_path: Option<&PathBuf>,
    label_pattern: &str,
) -> Result<u8> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let fname = csv_path
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str());
    if let Some(fname) = fname {
        if let Some(t) = trimester::from_filename(fname, label_pattern) {
            println!("Using trimester from csv file name: {}", t);
            return Ok(t);
        }
        bail!(
            "unable to guess trimester from csv file name \"{}\"; the trimester must be explicitly given (launch the program with -h to see usage)",
            fname
        );
    }
    bail!("no trimester provided (use the -t option)")
}

/// Trimester for the tools that can fall back on the website's default
/// period, then on the date heuristic confirmed by the operator.
pub fn resolve_trimester_or_ask(
    explicit: Option<u8>,
    csv_path: Option<&PathBuf>,
    backend_session: &mut dyn Backend,
    ui: &dyn Prompt,
) -> Result<u8> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let pattern = backend_session.trimester_label_pattern();
    if let Some(fname) = csv_path.and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
        if let Some(t) = trimester::from_filename(fname, pattern) {
            println!("Using trimester from csv file name: {}", t);
            return Ok(t);
        }
    }
    if let Ok(t) = backend_session.default_trimester() {
        println!("No trimester provided. Guessing trimester {} from website.", t);
        return Ok(t);
    }
    let guessed = trimester::guess_today();
    let keep = ui.confirm_yn(&format!(
        "No trimester provided. Guessed trimester {} based on current date. Is this correct?",
        guessed
    ))?;
    if keep {
        return Ok(guessed);
    }
    let options: Vec<String> =
        (1..=3).map(|t| format!("Trimester {}", t)).collect();
    let choice = ui.pick("Choose trimester:", &options)?;
    Ok(trimester::number_in(&choice).unwrap_or(guessed))
}

/// `--x` / `--no-x` flag pairs: unset means "ask" for most tools.
pub fn opt_flag(yes: bool, no: bool) -> Option<bool> {
    if yes {
        Some(true)
    } else if no {
        Some(false)
    } else {
        None
    }
}

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_target(false)
        .init();
}

/// Uniform error handling of the tools: errors print as one line, not
/// a backtrace.
pub fn run_tool<F: FnOnce() -> Result<()>>(run: F) {
    init_logger();
    if let Err(e) = run() {
        println!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::MemoryPrompt;

    #[test]
    fn test_resolve_group_name_prefers_argument() {
        let rows = vec![vec!["1G79".to_string()]];
        let name = resolve_group_name(Some("MATHTC".into()), Some(&rows)).unwrap();
        assert_eq!(name, "MATHTC");
        let name = resolve_group_name(None, Some(&rows)).unwrap();
        assert_eq!(name, "1G79");
        assert!(resolve_group_name(None, None).is_err());
    }

    #[test]
    fn test_resolve_trimester_from_filename() {
        let pattern = r"(?:1er|2ème|3ème) Trimestre";
        let path = PathBuf::from("MATHTC 1G79 2ème Trimestre.csv");
        assert_eq!(resolve_trimester(None, Some(&path), pattern).unwrap(), 2);
        assert_eq!(resolve_trimester(Some(3), Some(&path), pattern).unwrap(), 3);
        let plain = PathBuf::from("notes.csv");
        assert!(resolve_trimester(None, Some(&plain), pattern).is_err());
        assert!(resolve_trimester(None, None, pattern).is_err());
    }

    #[test]
    fn test_trimester_choice_falls_back_to_pick() {
        struct NoDefault;
        impl Backend for NoDefault {
            fn label(&self) -> &'static str { "noop" }
            fn trimester_label_pattern(&self) -> &'static str { r"Trimestre (?:1|2|3)" }
            fn groups(&mut self) -> Result<Vec<backend::Group>> { Ok(vec![]) }
            fn resolve_group(&mut self, name: &str) -> Result<backend::Group> {
                bail!("unknown group {}", name)
            }
            fn default_trimester(&mut self) -> Result<u8> { bail!("no period info") }
            fn grade_sheet(&mut self, _g: &backend::Group, _t: u8) -> Result<backend::GradeSheet> {
                Ok(backend::GradeSheet::default())
            }
            fn upload_grades(
                &mut self,
                _g: &backend::Group,
                _t: u8,
                _s: &backend::GradeSheet,
                _c: &backend::GradeChanges,
            ) -> Result<()> {
                Ok(())
            }
            fn send_message(
                &mut self,
                _q: &str,
                _k: backend::RecipientKind,
                _s: &str,
                _b: &str,
            ) -> Result<()> {
                Ok(())
            }
        }
        let ui = MemoryPrompt::new(&["n", "Trimester 2"]);
        let mut b = NoDefault;
        let t = resolve_trimester_or_ask(None, None, &mut b, &ui).unwrap();
        assert_eq!(t, 2);
    }
}
