use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use clap::Parser;

use lvsync::args::{self, CommonArgs, Session};
use lvsync::backend::Backend;
use lvsync::prompt::{parse_date_dmy, parse_time_hhmm};
use lvsync::rooms::{self, RoomSchedules, ScheduleCache, TimeOfDay};
use lvsync::store;

/// Downloads the time schedule for each room then displays the ones
/// which are free at a given date and time. Without any arguments,
/// asks for date and time.
#[derive(Parser, Debug)]
#[command(name = "lvs-free-rooms")]
struct Cli {
    /// Use current date and time, without any dialog.
    #[arg(long)]
    now: bool,

    /// Format is HH:MM.
    #[arg(short = 'T', long)]
    time: Option<String>,

    /// Format is DD/MM/YYYY.
    #[arg(short = 'd', long, value_name = "DATE")]
    date: Option<String>,

    /// A list of names of rooms to exclude from the search, separated
    /// by spaces.
    #[arg(long = "excluded-rooms", value_name = "ROOM", num_args = 0..)]
    excluded_rooms: Vec<String>,

    /// How long the room is needed in minutes. Low values might lead
    /// to include recess time.
    #[arg(long, default_value_t = 21)]
    duration: u32,

    /// The program displays additional rooms after those that are free
    /// now. This sets the maximum amount of time (in minutes) to look
    /// for those rooms.
    #[arg(long = "max-delay", default_value_t = 30)]
    max_delay: u32,

    /// Download the week's schedules again even if they are in the
    /// cache.
    #[arg(long)]
    refresh: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn week_schedules(
    cli: &Cli,
    backend: &mut dyn Backend,
    date: NaiveDate,
    start_is_now: bool,
) -> Result<RoomSchedules> {
    let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
    let week_key = monday.format("%Y-%m-%d").to_string();
    let cache_path = store::cache_dir().map(|d| d.join("room_weeks.json"));
    let mut cache: ScheduleCache = match &cache_path {
        Some(path) if path.is_file() => store::load_json(path).unwrap_or_default(),
        _ => ScheduleCache::default(),
    };
    if !cli.refresh {
        if let Some(found) = cache.weeks.get(&week_key) {
            println!("Using cached schedules for the week of {}", week_key);
            return Ok(found.clone());
        }
    }
    if !start_is_now {
        let date_dmy = format!("{:02}/{:02}/{}", date.day(), date.month(), date.year());
        backend.select_week(&date_dmy)?;
    }
    let room_list = backend.rooms()?;
    println!("Downloading room schedules");
    let mut schedules = RoomSchedules::new();
    for room in &room_list {
        println!("{}", room.name);
        schedules.insert(room.name.clone(), backend.room_week(room)?);
    }
    cache.weeks.insert(week_key, schedules.clone());
    if let Some(path) = &cache_path {
        if let Err(e) = store::save_json(path, &cache) {
            log::warn!("could not write the schedule cache: {}", e);
        }
    }
    Ok(schedules)
}

fn free_rooms(cli: &Cli, session: &Session, backend: &mut dyn Backend) -> Result<()> {
    let ui = session.ui.as_ref();
    let mut date_arg = cli.date.clone();
    let mut time_arg = cli.time.clone();
    if cli.now {
        date_arg = None;
        time_arg = None;
    } else if date_arg.is_none() && time_arg.is_none() {
        let use_now = ui.confirm_yn("Use the current date and time?")?;
        if !use_now {
            date_arg = Some(ui.date_dmy("Enter the date for which to check for free rooms.")?);
            time_arg = ui.time_hhmm("Enter a time.")?;
        }
    }

    let mut start_is_now = true;
    let now = Local::now();
    let date = match &date_arg {
        Some(s) => {
            start_is_now = false;
            let (day, month, year) = parse_date_dmy(s).ok_or_else(|| {
                anyhow!("invalid format for date string (should be DD/MM/YYYY): {}", s)
            })?;
            NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| anyhow!("invalid date: {}", s))?
        }
        None => now.date_naive(),
    };
    let start = match &time_arg {
        Some(s) => {
            start_is_now = false;
            let (hour, minute) = parse_time_hhmm(s).ok_or_else(|| {
                anyhow!("invalid format for time string (should be HH:MM): {}", s)
            })?;
            TimeOfDay::new(hour, minute)
        }
        None => {
            let t = TimeOfDay::new(now.hour() as u8, now.minute() as u8);
            println!("Using current time {}", t);
            t
        }
    };

    let mut excluded: BTreeSet<String> = cli.excluded_rooms.iter().cloned().collect();
    if excluded.is_empty() {
        if let Some(from_config) = &session.config.excluded_rooms {
            excluded = from_config.iter().cloned().collect();
        }
    }

    let schedules = week_schedules(cli, backend, date, start_is_now)?;
    let week = rooms::build_week(&schedules);
    let room_names: BTreeSet<String> = schedules.keys().cloned().collect();
    // Rooms free all week are reported apart, not per time slot.
    let mut excluded_from_search = excluded.clone();
    excluded_from_search.extend(week.always_free.iter().cloned());

    let found = rooms::free_rooms_search(
        &week,
        &room_names,
        date.day(),
        start,
        &excluded_from_search,
        cli.duration,
        cli.max_delay,
    )?;
    let day_schedules = rooms::room_day_schedules(&week, date.day());
    let whole_day = rooms::week_bounds(&week)
        .ok_or_else(|| anyhow!("no schedule information at all for that week"))?;
    let mut always_free = week.always_free.clone();
    always_free.retain(|room| !excluded.contains(room));

    let report = rooms::render_free_rooms(&found, &day_schedules, whole_day, &always_free, start_is_now);
    println!("{}", report);
    ui.message("Done.");
    Ok(())
}

fn main() {
    args::run_tool(|| {
        let cli = Cli::parse();
        let session = args::resolve(&cli.common)?;
        let mut backend = args::open_backend(&session, &cli.common)?;
        let result = free_rooms(&cli, &session, backend.as_mut());
        backend.close();
        result
    });
}
