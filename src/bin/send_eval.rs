use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session, UploadArgs};
use lvsync::backend::Backend;
use lvsync::{reconcile, sheet};

/// Upload the grades of a single evaluation from a csv file. Same
/// reconciliation as lvs-send-grades, restricted to one column; handy
/// right after a test, when the rest of the sheet is stale.
#[derive(Parser, Debug)]
#[command(name = "lvs-send-eval")]
struct Cli {
    /// The csv file in which grades will be read. Can be omitted if
    /// there is only one csv file in the working directory.
    #[arg(value_name = "CSV_FILE")]
    csv_file: Option<PathBuf>,

    /// The name of the evaluation to upload. Default is to choose from
    /// the evaluations found in the csv file.
    #[arg(short, long, value_name = "EVAL")]
    evaluation: Option<String>,

    /// Overwrite existing grades of the evaluation on the website
    /// (including deleting them if they are not present in the CSV).
    /// Default is to not delete.
    #[arg(long, visible_alias = "overwrite", overrides_with = "no_delete")]
    delete: bool,
    #[arg(long, hide_short_help = true)]
    no_delete: bool,

    /// Create the evaluation if it does not exist on the website.
    /// Default is to create.
    #[arg(long, overrides_with = "no_create")]
    create: bool,
    #[arg(long, hide_short_help = true)]
    no_create: bool,

    /// When creating the evaluation, keep it hidden from students.
    #[arg(long)]
    hidden: bool,

    #[command(flatten)]
    upload: UploadArgs,

    #[command(flatten)]
    common: CommonArgs,
}

fn send_eval(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    let never_delete = !args::opt_flag(cli.delete, cli.no_delete).unwrap_or(false);
    let create_missing = args::opt_flag(cli.create, cli.no_create).unwrap_or(true);

    let pattern = backend.trimester_label_pattern();
    let csv_path = args::resolve_csv(session, cli.csv_file.clone(), pattern, true, false, false, true)?
        .ok_or_else(|| anyhow!("unable to find or guess CSV file"))?;
    let rows = sheet::read_rows(&csv_path)?;
    let group_name = args::resolve_group_name(cli.upload.group_name.clone(), Some(&rows))?;
    let trimester =
        args::resolve_trimester_or_ask(cli.upload.trimester, Some(&csv_path), backend, ui)?;

    let csv_evals = sheet::evaluations(&rows)?;
    let title = match &cli.evaluation {
        Some(t) => t.clone(),
        None => {
            let titles: Vec<String> = csv_evals.iter().map(|e| e.title.clone()).collect();
            ui.pick("Evaluation name not provided. Choose one:", &titles)?
        }
    };
    let chosen: Vec<sheet::CsvEval> =
        csv_evals.into_iter().filter(|e| e.title == title).collect();
    if chosen.is_empty() {
        return Err(anyhow!("evaluation {} does not appear in CSV file", title));
    }

    let group = backend.resolve_group(&group_name)?;
    let mut server = backend.grade_sheet(&group, trimester)?;
    let (created, paired) = reconcile::pair_evaluations(
        backend,
        ui,
        &group,
        trimester,
        &server,
        &chosen,
        create_missing && !cli.upload.dry_run,
        cli.hidden,
    )?;
    if created {
        server = backend.grade_sheet(&group, trimester)?;
    }

    let matched = reconcile::match_students(&server, &sheet::student_rows(&rows));
    matched.report();
    let plan = reconcile::plan_grades(&server, &matched, &paired, never_delete);
    for warning in &plan.warnings {
        println!("Warning: {}", warning);
    }
    let names = server.student_names();
    for eval in &plan.per_eval {
        if !eval.writes.is_empty() {
            println!("Evaluation \"{}\": {} grade(s) to upload.", eval.title, eval.writes.len());
            println!("{}", reconcile::students_preview(&names, &eval.writes));
        }
        if !eval.overwrites.is_empty() {
            println!(
                "Warning: {} grade(s) to upload would OVERWRITE an existing grade on website.",
                eval.overwrites.len()
            );
            println!("{}", reconcile::students_preview(&names, &eval.overwrites));
        }
        if !eval.deletes.is_empty() && !never_delete {
            println!(
                "Warning: {} grade(s) to upload would DELETE an existing grade on website.",
                eval.deletes.len()
            );
            println!("{}", reconcile::students_preview(&names, &eval.deletes));
        }
    }
    if plan.write_count() == 0 {
        println!("No grades need to be uploaded.");
        return Ok(());
    }
    if cli.upload.dry_run {
        println!("Not uploading as per option.");
        return Ok(());
    }
    let go = reconcile::confirm_upload(
        ui,
        "grade",
        plan.write_count(),
        plan.overwrite_count(),
        plan.delete_count(),
        true,
        true,
    )?;
    if !go {
        println!("Aborting.");
        return Ok(());
    }
    println!("Uploading...");
    backend.upload_grades(&group, trimester, &server, &plan.changes)?;
    Ok(())
}

fn main() {
    args::run_tool(|| {
        let cli = Cli::parse();
        let session = args::resolve(&cli.common)?;
        let mut backend = args::open_backend(&session, &cli.common)?;
        let result = send_eval(&cli, &session, backend.as_mut());
        backend.close();
        session.ui.message("Done.");
        result
    });
}
