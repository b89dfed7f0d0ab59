use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session, UploadArgs};
use lvsync::backend::Backend;
use lvsync::{reconcile, sheet};

/// Upload grades from a csv file to an Axess or Pronote website.
#[derive(Parser, Debug)]
#[command(name = "lvs-send-grades")]
struct Cli {
    /// The csv file in which grades will be read. Can be omitted if
    /// there is only one csv file in the working directory. The program
    /// expects the file to be in the format exported by the website:
    /// evaluation names on the first line, with the cell below each
    /// name describing the maximum grade and grade multiplier as in
    /// "/10 - Coef : 0.5".
    #[arg(value_name = "CSV_FILE")]
    csv_file: Option<PathBuf>,

    /// Write grades to the website. Default is to ask. Note that this
    /// is independent from creating new evaluations. However,
    /// --no-write implies --no-delete.
    #[arg(long, overrides_with = "no_write")]
    write: bool,
    #[arg(long, hide_short_help = true)]
    no_write: bool,

    /// Overwrite existing grades on the website (including deleting
    /// them if they are not present in the CSV). Default is to not
    /// delete. This does not delete evaluations.
    #[arg(long, visible_alias = "overwrite", overrides_with = "no_delete")]
    delete: bool,
    #[arg(long, hide_short_help = true)]
    no_delete: bool,

    /// Create evaluations if they do not exist on the website. Default
    /// is to create.
    #[arg(long, overrides_with = "no_create")]
    create: bool,
    #[arg(long, hide_short_help = true)]
    no_create: bool,

    /// When creating evaluations, keep them hidden from students
    /// (corresponds to the "publish" option on the website). Default is
    /// to publish. Does not affect evaluations which already exist.
    #[arg(long)]
    hidden: bool,

    #[command(flatten)]
    upload: UploadArgs,

    #[command(flatten)]
    common: CommonArgs,
}

fn send_grades(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    let write = args::opt_flag(cli.write, cli.no_write);
    let (ask_to_write, never_write) = match write {
        None => (true, false),
        Some(w) => (false, !w),
    };
    let mut delete = args::opt_flag(cli.delete, cli.no_delete);
    if write == Some(false) {
        // Let a --no-write run still show what deletes would happen.
        delete = Some(true);
    }
    let (ask_to_delete, never_delete) = match delete {
        None => (false, true),
        Some(d) => (false, !d),
    };
    let create_missing = args::opt_flag(cli.create, cli.no_create).unwrap_or(true);

    let pattern = backend.trimester_label_pattern();
    let csv_path = args::resolve_csv(session, cli.csv_file.clone(), pattern, true, false, false, true)?
        .ok_or_else(|| anyhow!("unable to find or guess CSV file"))?;
    let rows = sheet::read_rows(&csv_path)?;
    let group_name = args::resolve_group_name(cli.upload.group_name.clone(), Some(&rows))?;
    let trimester = args::resolve_trimester(cli.upload.trimester, Some(&csv_path), pattern)?;
    let csv_evals = sheet::evaluations(&rows)?;

    let group = backend.resolve_group(&group_name)?;
    let mut server = backend.grade_sheet(&group, trimester)?;
    let (created, paired) = reconcile::pair_evaluations(
        backend,
        ui,
        &group,
        trimester,
        &server,
        &csv_evals,
        create_missing && !cli.upload.dry_run,
        cli.hidden,
    )?;
    if created {
        // Redownload grades after creating evaluations (the web app
        // also does this); it avoids uploading a lot of empty grades.
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
                "Warning: in evaluation \"{}\": {} grade(s) to upload would OVERWRITE an existing grade on website.",
                eval.title,
                eval.overwrites.len()
            );
            println!("{}", reconcile::students_preview(&names, &eval.overwrites));
        }
        if !eval.deletes.is_empty() && !never_delete {
            println!(
                "Warning: in evaluation \"{}\": {} grade(s) to upload would DELETE an existing grade on website.",
                eval.title,
                eval.deletes.len()
            );
            println!("{}", reconcile::students_preview(&names, &eval.deletes));
        }
    }
    if plan.write_count() == 0 {
        println!("No grades need to be uploaded.");
        return Ok(());
    }
    if never_write || cli.upload.dry_run {
        println!("Not uploading as per option.");
        return Ok(());
    }
    let go = reconcile::confirm_upload(
        ui,
        "grade",
        plan.write_count(),
        plan.overwrite_count(),
        plan.delete_count(),
        ask_to_write,
        ask_to_delete,
    )?;
    if !go {
        println!("Aborting.");
        if plan.delete_count() > 0 {
            println!("You can upload grades without deleting existing ones with the --no-delete option.");
        }
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
        let result = send_grades(&cli, &session, backend.as_mut());
        backend.close();
        session.ui.message("Done.");
        result
    });
}
