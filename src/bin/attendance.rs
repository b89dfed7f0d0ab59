use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session};
use lvsync::attendance::{self, AttendanceBook};
use lvsync::backend::Backend;
use lvsync::sheet;

/// Checks student attendance on an Axess website, around a test date.
/// Will interactively prompt for most arguments if not given.
#[derive(Parser, Debug)]
#[command(name = "lvs-attendance")]
struct Cli {
    /// The date for which to check attendance. Format is DD/MM/YYYY.
    #[arg(value_name = "DATE")]
    test_date: Option<String>,

    /// A CSV file generated by the website. If provided, group name
    /// and trimester can be omitted.
    #[arg(short = 'f', long = "csv-file", value_name = "FILE")]
    csv_file: Option<PathBuf>,

    /// Check attendance for all students in a group. In this case the
    /// evaluation name can be omitted.
    #[arg(short = 'a', long = "all-students")]
    all_students: bool,

    /// The name of the evaluation (test) for which to check
    /// attendance. Only students who do not have a numeric non zero
    /// grade will be checked (an empty cell or "ABS" will be checked).
    /// Grades are taken from the CSV file if provided, or from the
    /// website.
    #[arg(short = 'e', long = "evaluation", value_name = "EVAL")]
    evaluation: Option<String>,

    /// Write attendance to this file instead of standard output.
    #[arg(short = 'o', long = "output-file")]
    output_file: Option<PathBuf>,

    /// Trimester. Must be 1, 2 or 3. Default is to guess.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
    trimester: Option<u8>,

    /// The name of the group (or class) of students. Default is to
    /// guess from the csv file content, or to ask.
    #[arg(short, long = "group", value_name = "GROUP")]
    group_name: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

fn check_attendance(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    let pattern = backend.trimester_label_pattern();
    let csv_path = args::resolve_csv(session, cli.csv_file.clone(), pattern, false, true, true, false)?;
    let rows = match &csv_path {
        Some(path) => Some(sheet::read_rows(path)?),
        None => None,
    };

    let group_name = match &cli.group_name {
        Some(name) => name.clone(),
        None => match &rows {
            Some(rows) => args::resolve_group_name(None, Some(rows))?,
            None => {
                let names: Vec<String> =
                    backend.groups()?.iter().map(|g| g.name.clone()).collect();
                ui.pick("Group name not provided. Choose one:", &names)?
            }
        },
    };

    let mut all_students = cli.all_students;
    let mut eval_name = cli.evaluation.clone();
    if eval_name.is_none() && !all_students {
        // Maybe the user actually wanted the whole group; better to
        // know before downloading a grade sheet.
        let from_list = ui.confirm_yn(
            "Select evaluation from a list? (Choosing \"No\" will get attendance from all students of the group.)",
        )?;
        all_students = !from_list;
    }

    let to_check: Vec<String>;
    let mut grades: Option<HashMap<String, String>> = None;
    let mut test_date = cli.test_date.clone();

    if all_students {
        if test_date.is_none() {
            println!("No date provided.");
            test_date = Some(ui.date_dmy("Please input the date for which to check attendance.")?);
        }
        let group = backend.resolve_group(&group_name)?;
        // Any trimester lists the same students; the first one always
        // exists.
        let server = backend.grade_sheet(&group, 1)?;
        to_check = server.students.iter().map(|s| s.name.clone()).collect();
    } else {
        let mut selection: Option<(Vec<String>, HashMap<String, String>)> = None;
        if let Some(rows) = &rows {
            let (checked, csv_grades, title) =
                attendance::students_from_csv(rows, eval_name.as_deref(), ui)?;
            eval_name = Some(title);
            selection = Some((checked, csv_grades));
        }
        if selection.is_none() || test_date.is_none() {
            let trimester =
                args::resolve_trimester_or_ask(cli.trimester, csv_path.as_ref(), backend, ui)?;
            let group = backend.resolve_group(&group_name)?;
            let server = backend.grade_sheet(&group, trimester)?;
            let titles: Vec<String> =
                server.evaluations.iter().map(|e| e.title.clone()).collect();
            let title = match eval_name.clone() {
                Some(t) => t,
                None => {
                    if titles.is_empty() {
                        bail!("no evaluation (test) for that group");
                    }
                    ui.pick("Evaluation (test) name not provided. Choose one:", &titles)?
                }
            };
            let eval = server.evaluation_titled(&title).ok_or_else(|| {
                anyhow!(
                    "evaluation (test) name {} not found on website; either create it on the website or provide a CSV file that includes it",
                    title
                )
            })?;
            if selection.is_none() {
                selection = Some(attendance::students_from_sheet(&server, &eval.id)?);
            }
            if test_date.is_none() {
                test_date = match &eval.date_ymd {
                    Some(date_ymd) => {
                        let guessed = attendance::date_dmy_of_ymd(date_ymd);
                        let keep = ui.confirm_yn(&format!(
                            "Evaluation (test) date not provided. Guessed date {} from website. Is this correct?",
                            guessed
                        ))?;
                        if keep {
                            Some(guessed)
                        } else {
                            Some(ui.date_dmy("Please input the date for which to check attendance.")?)
                        }
                    }
                    None => Some(ui.date_dmy("Please input the date for which to check attendance.")?),
                };
            }
            eval_name = Some(title);
        }
        let (checked, csv_grades) =
            selection.ok_or_else(|| anyhow!("no students selected for the attendance check"))?;
        to_check = checked;
        grades = Some(csv_grades);
    }
    let test_date = test_date.ok_or_else(|| anyhow!("no date provided, aborting"))?;

    let classgroups = backend.attendance_classgroups()?;
    let mut ids: HashMap<String, (String, String)> = HashMap::new();
    for (_, classgroup_id) in &classgroups {
        for (name, student_id) in backend.classgroup_students(classgroup_id)? {
            ids.insert(name, (classgroup_id.clone(), student_id));
        }
    }
    let mut book = AttendanceBook::default();
    let mut not_found: HashSet<String> = HashSet::new();
    for name in &to_check {
        match ids.get(name) {
            None => {
                not_found.insert(name.clone());
            }
            Some((classgroup_id, student_id)) => {
                println!("Reading calendar for student {}", name);
                let entries = backend.student_calendar(classgroup_id, student_id)?;
                book.add_calendar(name, &entries);
            }
        }
    }
    if !not_found.is_empty() {
        let mut names: Vec<&str> = not_found.iter().map(String::as_str).collect();
        names.sort_unstable();
        println!(
            "Warning: The following students were not on the attendance lists: {}",
            names.join(", ")
        );
    }

    let output = book.render(
        &test_date,
        &group_name,
        eval_name.as_deref(),
        &to_check,
        &not_found,
        grades.as_ref(),
    );
    let mut output_file = cli.output_file.clone();
    if output_file.is_none() {
        // Blank lines around the report make it readable in a terminal.
        println!("\n{}", output);
        let save = ui.confirm_ny("The output is being displayed. Save it to a file?")?;
        if save {
            output_file = ui.save_file("Chose a file to save the output:", Some("txt"))?;
        }
    }
    if let Some(path) = output_file {
        println!("Writing output to {}", path.display());
        if let Err(e) = std::fs::write(&path, &output) {
            println!("Error: Couldn't write to file {} ({}).", path.display(), e);
            println!("Falling back to standard output:");
            println!("\n{}", output);
        }
    }
    println!("Done.");
    Ok(())
}

fn main() {
    args::run_tool(|| {
        let cli = Cli::parse();
        let session = args::resolve(&cli.common)?;
        let mut backend = args::open_backend(&session, &cli.common)?;
        let result = check_attendance(&cli, &session, backend.as_mut());
        backend.close();
        result
    });
}
