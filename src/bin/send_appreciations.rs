use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session, UploadArgs};
use lvsync::backend::Backend;
use lvsync::{reconcile, sheet};

/// Upload student appreciations from a csv file to an Axess website.
/// The file must contain a column named "Appréciations générales".
#[derive(Parser, Debug)]
#[command(name = "lvs-send-appreciations")]
struct Cli {
    /// The csv file in which appreciations will be read. Can be
    /// omitted if there is only one csv file in the working directory.
    #[arg(value_name = "CSV_FILE")]
    csv_file: Option<PathBuf>,

    /// Write appreciations to the website. Default is to ask.
    /// --no-write implies --no-delete.
    #[arg(long, overrides_with = "no_write")]
    write: bool,
    #[arg(long, hide_short_help = true)]
    no_write: bool,

    /// Overwrite existing appreciations on the website. Default is to
    /// ask before overwriting.
    #[arg(long, visible_alias = "overwrite", overrides_with = "no_delete")]
    delete: bool,
    #[arg(long, hide_short_help = true)]
    no_delete: bool,

    #[command(flatten)]
    upload: UploadArgs,

    #[command(flatten)]
    common: CommonArgs,
}

fn send_appreciations(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    let write = args::opt_flag(cli.write, cli.no_write);
    let (ask_to_write, never_write) = match write {
        None => (true, false),
        Some(w) => (false, !w),
    };
    let mut delete = args::opt_flag(cli.delete, cli.no_delete);
    if write == Some(false) {
        delete = Some(true);
    }
    let ask_to_delete = delete.is_none();

    let pattern = backend.trimester_label_pattern();
    let csv_path = args::resolve_csv(session, cli.csv_file.clone(), pattern, true, false, false, true)?
        .ok_or_else(|| anyhow!("unable to find or guess CSV file"))?;
    let rows = sheet::read_rows(&csv_path)?;
    let group_name = args::resolve_group_name(cli.upload.group_name.clone(), Some(&rows))?;
    let trimester = args::resolve_trimester(cli.upload.trimester, Some(&csv_path), pattern)?;
    let appr_col = sheet::appreciation_col(&rows)?;

    let group = backend.resolve_group(&group_name)?;
    let server = backend.grade_sheet(&group, trimester)?;
    let web_apprs = backend.appreciations(&group, trimester)?;

    let matched = reconcile::match_students(&server, &sheet::student_rows(&rows));
    matched.report();
    let plan = reconcile::plan_appreciations(&web_apprs, &matched, appr_col);
    let names = server.student_names();
    if !plan.writes.is_empty() {
        println!("{} appreciation(s) to upload.", plan.writes.len());
        println!("{}", reconcile::students_preview(&names, &plan.writes));
    }
    if !plan.overwrites.is_empty() {
        println!(
            "Warning: {} appreciation(s) to upload would OVERWRITE an existing appreciation on website.",
            plan.overwrites.len()
        );
        println!("{}", reconcile::students_preview(&names, &plan.overwrites));
    }
    if plan.writes.is_empty() {
        println!("No appreciations need to be uploaded.");
        return Ok(());
    }
    if never_write || cli.upload.dry_run {
        println!("Not uploading as per option.");
        return Ok(());
    }
    let go = reconcile::confirm_upload(
        ui,
        "appreciation",
        plan.writes.len(),
        plan.overwrites.len(),
        0,
        ask_to_write,
        ask_to_delete,
    )?;
    if !go {
        println!("Aborting.");
        return Ok(());
    }
    for (student_id, _) in &plan.changes {
        if let Some(name) = names.get(student_id) {
            println!("Uploading: {}", name);
        }
    }
    backend.upload_appreciations(&group, trimester, &plan.changes)?;
    Ok(())
}

fn main() {
    args::run_tool(|| {
        let cli = Cli::parse();
        let session = args::resolve(&cli.common)?;
        let mut backend = args::open_backend(&session, &cli.common)?;
        let result = send_appreciations(&cli, &session, backend.as_mut());
        backend.close();
        session.ui.message("Done.");
        result
    });
}
