use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Minute-precision time of day. Derived ordering is lexicographic on
/// (hour, minute), which is the time ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// No day wrap: a slot pushed past midnight keeps growing its hour,
    /// so ordering against same-day times stays correct.
    pub fn plus_minutes(self, minutes: u32) -> Self {
        let total = self.hour as u32 * 60 + self.minute as u32 + minutes;
        Self { hour: (total / 60) as u8, minute: (total % 60) as u8 }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}h{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Slot {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// Strict inequalities so that 8h-9h00 and 9h00-10h don't overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        if self.start < other.start {
            other.start < self.end
        } else {
            self.start < other.end
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Downloaded schedules, one entry per room: (day of month, slot).
/// This is also the unit stored in the week cache.
pub type RoomSchedules = BTreeMap<String, Vec<(u32, Slot)>>;

/// Cache of week schedules keyed by the Monday of the week (ISO date).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScheduleCache {
    pub weeks: BTreeMap<String, RoomSchedules>,
}

/// Occupancy for one week: day of month -> slot -> rooms occupied in
/// that slot. Rooms with no class at all in the week are kept apart.
#[derive(Debug, Default)]
pub struct WeekSlots {
    pub by_day: BTreeMap<u32, BTreeMap<Slot, BTreeSet<String>>>,
    pub always_free: BTreeSet<String>,
}

pub fn build_week(schedules: &RoomSchedules) -> WeekSlots {
    let mut week = WeekSlots::default();
    for (room, entries) in schedules {
        if entries.is_empty() {
            week.always_free.insert(room.clone());
            continue;
        }
        for (day, slot) in entries {
            week.by_day
                .entry(*day)
                .or_default()
                .entry(*slot)
                .or_default()
                .insert(room.clone());
        }
    }
    week
}

/// Rooms free for `duration` minutes from `start`, by elimination of
/// every room occupied in an overlapping slot.
pub fn free_rooms_at(
    week: &WeekSlots,
    rooms: &BTreeSet<String>,
    day: u32,
    start: TimeOfDay,
    duration: u32,
) -> Result<BTreeSet<String>> {
    let slots = match week.by_day.get(&day) {
        Some(s) => s,
        None => bail!("no schedule information for day {} of the month", day),
    };
    let requested = Slot::new(start, start.plus_minutes(duration));
    let mut free: BTreeSet<String> = rooms.clone();
    for (slot, occupied) in slots {
        if slot.overlaps(&requested) {
            for room in occupied {
                free.remove(room);
            }
        }
    }
    Ok(free)
}

/// Free rooms at the start time and at every slot end within
/// `max_delay` minutes after it (a room about to be freed is worth
/// waiting for). Each start's set is pruned of the rooms already free
/// at the previous start and of the excluded rooms; empty entries are
/// dropped.
pub fn free_rooms_search(
    week: &WeekSlots,
    rooms: &BTreeSet<String>,
    day: u32,
    start: TimeOfDay,
    excluded: &BTreeSet<String>,
    duration: u32,
    max_delay: u32,
) -> Result<Vec<(TimeOfDay, BTreeSet<String>)>> {
    let mut possible_starts: BTreeSet<TimeOfDay> = BTreeSet::new();
    possible_starts.insert(start);
    let last_start = start.plus_minutes(max_delay);
    if let Some(slots) = week.by_day.get(&day) {
        for slot in slots.keys() {
            if start < slot.end && slot.end < last_start {
                possible_starts.insert(slot.end);
            }
        }
    }
    let mut unpruned: Vec<(TimeOfDay, BTreeSet<String>)> = vec![];
    for t in &possible_starts {
        unpruned.push((*t, free_rooms_at(week, rooms, day, *t, duration)?));
    }
    let mut found = vec![];
    let mut previous: Option<&BTreeSet<String>> = None;
    for (t, free) in &unpruned {
        let mut pruned: BTreeSet<String> = free
            .iter()
            .filter(|room| previous.map_or(true, |prev| !prev.contains(*room)))
            .cloned()
            .collect();
        pruned.retain(|room| !excluded.contains(room));
        if !pruned.is_empty() {
            found.push((*t, pruned));
        }
        // Prune against the unpruned previous set, to still show rooms
        // that are occupied then free again.
        previous = Some(free);
    }
    Ok(found)
}

/// Per-room sorted slots for one day of the week.
pub fn room_day_schedules(week: &WeekSlots, day: u32) -> BTreeMap<String, Vec<Slot>> {
    let mut schedules: BTreeMap<String, Vec<Slot>> = BTreeMap::new();
    if let Some(slots) = week.by_day.get(&day) {
        for (slot, occupied) in slots {
            for room in occupied {
                schedules.entry(room.clone()).or_default().push(*slot);
            }
        }
    }
    for slots in schedules.values_mut() {
        slots.sort();
    }
    schedules
}

/// Earliest start and latest end over the whole week; the bounds used
/// when a room has nothing scheduled around the requested time.
pub fn week_bounds(week: &WeekSlots) -> Option<Slot> {
    let mut bounds: Option<Slot> = None;
    for slots in week.by_day.values() {
        for slot in slots.keys() {
            bounds = Some(match bounds {
                None => *slot,
                Some(b) => Slot::new(b.start.min(slot.start), b.end.max(slot.end)),
            });
        }
    }
    bounds
}

/// Renders the search result: per start time, each newly free room with
/// its maximal free interval around that time, longest remaining time
/// first. A `+` marks rooms free until the end of the day.
pub fn render_free_rooms(
    found: &[(TimeOfDay, BTreeSet<String>)],
    day_schedules: &BTreeMap<String, Vec<Slot>>,
    whole_day: Slot,
    always_free: &BTreeSet<String>,
    start_is_now: bool,
) -> String {
    let mut out = String::new();
    let empty: Vec<Slot> = vec![];
    for (i, (start, rooms)) in found.iter().enumerate() {
        let start_s = if i == 0 && start_is_now {
            format!("now ({})", start)
        } else {
            format!("at {}", start)
        };
        if i == 0 {
            out.push_str(&format!("Rooms free {}:\n", start_s));
        } else {
            out.push_str(&format!("\nAdditional rooms free {}:\n", start_s));
        }
        let mut free_slot_rooms: Vec<(Slot, &String)> = vec![];
        for room in rooms {
            let mut free = whole_day;
            for slot in day_schedules.get(room).unwrap_or(&empty) {
                // A slot ending before the start pushes the free
                // interval's start up; one starting after pulls its end
                // in.
                if free.start <= slot.end && slot.end <= *start {
                    free.start = slot.end;
                }
                if free.end >= slot.start && slot.start >= *start {
                    free.end = slot.start;
                }
            }
            free_slot_rooms.push((free, room));
        }
        free_slot_rooms.sort_by(|a, b| b.0.end.cmp(&a.0.end));
        let width = free_slot_rooms.iter().map(|(_, r)| r.chars().count()).max().unwrap_or(0);
        for (slot, room) in free_slot_rooms {
            let end_of_day = if slot.end == whole_day.end { "+" } else { "" };
            out.push_str(&format!("{:<w$}   {}{}\n", room, slot, end_of_day, w = width));
        }
    }
    if !always_free.is_empty() {
        out.push_str("\nRooms with no schedule for the week:\n");
        out.push_str(&always_free.iter().cloned().collect::<Vec<_>>().join("\n"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m)
    }

    fn slot(h1: u8, m1: u8, h2: u8, m2: u8) -> Slot {
        Slot::new(t(h1, m1), t(h2, m2))
    }

    fn schedules() -> RoomSchedules {
        let mut s = RoomSchedules::new();
        s.insert("A101".into(), vec![(12, slot(8, 0, 9, 0))]);
        s.insert("A102".into(), vec![(12, slot(8, 0, 10, 0))]);
        s.insert("B201".into(), vec![(12, slot(10, 0, 12, 0)), (13, slot(8, 0, 9, 0))]);
        s.insert("GYM".into(), vec![]);
        s
    }

    fn room_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_back_to_back_slots_do_not_overlap() {
        assert!(!slot(8, 0, 9, 0).overlaps(&slot(9, 0, 10, 0)));
        assert!(slot(8, 0, 9, 1).overlaps(&slot(9, 0, 10, 0)));
        assert!(slot(9, 30, 9, 45).overlaps(&slot(9, 0, 10, 0)));
    }

    #[test]
    fn test_plus_minutes_carries() {
        assert_eq!(t(9, 50).plus_minutes(21), t(10, 11));
        assert_eq!(t(9, 0).plus_minutes(0), t(9, 0));
    }

    #[test]
    fn test_build_week_collects_always_free() {
        let week = build_week(&schedules());
        assert!(week.always_free.contains("GYM"));
        assert_eq!(week.by_day.len(), 2);
        assert!(week.by_day[&12][&slot(8, 0, 9, 0)].contains("A101"));
    }

    #[test]
    fn test_free_rooms_by_elimination() {
        let week = build_week(&schedules());
        let rooms = room_set(&["A101", "A102", "B201", "GYM"]);
        // 8h30 for 21 minutes: A101 and A102 are in class, B201 free.
        let free = free_rooms_at(&week, &rooms, 12, t(8, 30), 21).unwrap();
        assert_eq!(free, room_set(&["B201", "GYM"]));
        // 9h40 for 21 minutes overlaps both A102's 8-10 class and
        // B201's 10-12 class.
        let free = free_rooms_at(&week, &rooms, 12, t(9, 40), 21).unwrap();
        assert_eq!(free, room_set(&["A101", "GYM"]));
    }

    #[test]
    fn test_unknown_day_is_an_error() {
        let week = build_week(&schedules());
        let rooms = room_set(&["A101"]);
        assert!(free_rooms_at(&week, &rooms, 25, t(8, 30), 21).is_err());
    }

    #[test]
    fn test_search_adds_soon_free_rooms_and_prunes() {
        let week = build_week(&schedules());
        let rooms = room_set(&["A101", "A102", "B201"]);
        let found =
            free_rooms_search(&week, &rooms, 12, t(8, 30), &BTreeSet::new(), 21, 60).unwrap();
        // At 8h30 only B201 is free; at 9h00 A101 frees up (A102 stays
        // in class until 10h00, beyond the delay window).
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], (t(8, 30), room_set(&["B201"])));
        assert_eq!(found[1], (t(9, 0), room_set(&["A101"])));
    }

    #[test]
    fn test_search_respects_exclusions() {
        let week = build_week(&schedules());
        let rooms = room_set(&["A101", "A102", "B201"]);
        let excluded = room_set(&["B201"]);
        let found = free_rooms_search(&week, &rooms, 12, t(8, 30), &excluded, 21, 60).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, t(9, 0));
    }

    #[test]
    fn test_render_marks_end_of_day() {
        let week = build_week(&schedules());
        let day_schedules = room_day_schedules(&week, 12);
        let whole_day = week_bounds(&week).unwrap();
        let found = vec![(t(10, 0), room_set(&["A101", "A102"]))];
        let s = render_free_rooms(&found, &day_schedules, whole_day, &BTreeSet::new(), true);
        assert!(s.starts_with("Rooms free now (10h00):"));
        // Both rooms stay free until the end of the week's day span;
        // A101's free interval opens when its 8-9 class ends.
        assert!(s.contains("A101   09h00 to 12h00+"));
        assert!(s.contains("A102   10h00 to 12h00+"));
    }

    #[test]
    fn test_render_lists_always_free_separately() {
        let week = build_week(&schedules());
        let s = render_free_rooms(&[], &BTreeMap::new(), slot(8, 0, 18, 0), &week.always_free, false);
        assert!(s.contains("Rooms with no schedule for the week:\nGYM"));
    }
}
