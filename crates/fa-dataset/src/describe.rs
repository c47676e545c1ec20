//! Human-readable overview of an FA file.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Duration;

use crate::catalog::{FieldNameClass, FieldRecord};
use crate::metadata::format_datetime;
use crate::source::FaSource;

const UNKNOWN: &str = "Unknown";

/// One row of the 3D or pseudo-3D table.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelGroup {
    pub basename: String,
    /// First full name of the group.
    pub example: String,
    pub spectral: Option<bool>,
    pub nbits: Option<i64>,
    pub levels: BTreeSet<u32>,
}

impl LevelGroup {
    /// `min - max` for a contiguous level set, the explicit list otherwise.
    pub fn level_range(&self) -> String {
        let (Some(first), Some(last)) = (self.levels.first(), self.levels.last()) else {
            return String::new();
        };
        if (last - first) as usize + 1 == self.levels.len() {
            format!("{} - {}", first, last)
        } else {
            let list: Vec<String> = self.levels.iter().map(u32::to_string).collect();
            format!("[{}]", list.join(", "))
        }
    }
}

/// Report built from an opened file. Rendered through `Display`.
pub struct FaDescription<'a> {
    source: &'a FaSource,
    fields_2d: Vec<&'a FieldRecord>,
    fields_3d: Vec<LevelGroup>,
    fields_pseudo_3d: Vec<LevelGroup>,
}

impl<'a> FaDescription<'a> {
    pub fn new(source: &'a FaSource) -> Self {
        let catalog = source.catalog();
        let mut fields_2d = Vec::new();
        let mut fields_3d: Vec<LevelGroup> = Vec::new();
        let mut fields_pseudo_3d: Vec<LevelGroup> = Vec::new();

        for record in source.records() {
            let (groups, basename, level) = match catalog.class_of(&record.name) {
                Some(FieldNameClass::Pure3D { basename, level }) => (&mut fields_3d, basename, *level),
                Some(FieldNameClass::Pseudo3D { basename, level }) => {
                    (&mut fields_pseudo_3d, basename, *level)
                }
                _ => {
                    fields_2d.push(record);
                    continue;
                }
            };
            match groups.iter_mut().find(|g| &g.basename == basename) {
                Some(group) => {
                    group.levels.insert(level);
                }
                None => groups.push(LevelGroup {
                    basename: basename.clone(),
                    example: record.name.clone(),
                    spectral: record.spectral,
                    nbits: record.nbits,
                    levels: BTreeSet::from([level]),
                }),
            }
        }

        Self {
            source,
            fields_2d,
            fields_3d,
            fields_pseudo_3d,
        }
    }

    pub fn fields_2d(&self) -> &[&'a FieldRecord] {
        &self.fields_2d
    }

    pub fn fields_3d(&self) -> &[LevelGroup] {
        &self.fields_3d
    }

    pub fn fields_pseudo_3d(&self) -> &[LevelGroup] {
        &self.fields_pseudo_3d
    }

    fn write_tables(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "########## 2D #########")?;
        writeln!(f)?;
        writeln!(f, "{:<19}{:<8}{:<10}{:<6}", "name", "index", "spectral", "nbits")?;
        writeln!(f, "{}", "-".repeat(42))?;
        for record in &self.fields_2d {
            writeln!(
                f,
                "{:<19} {:<8}{:<10}{:<6}",
                record.name,
                or_unknown(record.index),
                or_unknown(record.spectral),
                or_unknown(record.nbits)
            )?;
        }

        for (title, groups) in [("3D", &self.fields_3d), ("Pseudo 3D", &self.fields_pseudo_3d)] {
            writeln!(f)?;
            writeln!(f, "########## {} #########", title)?;
            writeln!(f)?;
            writeln!(
                f,
                "{:<19}{:<19}{:<10}{:<6}levels",
                "Base-name", "Full-name example", "spectral", "nbits"
            )?;
            writeln!(f, "{}", "-".repeat(61))?;
            for group in groups {
                writeln!(
                    f,
                    "{:<19} {:<19}{:<10}{:<6}{}",
                    group.basename,
                    group.example,
                    or_unknown(group.spectral),
                    or_unknown(group.nbits),
                    group.level_range()
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for FaDescription<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let md = self.source.metadata();

        writeln!(f, "### File format : FA")?;
        writeln!(f)?;
        writeln!(f, "## File name: {}", md.origin)?;
        writeln!(f, "## File path: {}", md.filepath)?;
        writeln!(f)?;

        section(f, "VALIDITY")?;
        writeln!(f, "Validity               : {}", format_datetime(&md.validate))?;
        writeln!(f, "Basedate               : {}", format_datetime(&md.basedate))?;
        writeln!(f, "Leadtime               : {}", format_duration(md.validate - md.basedate))?;
        writeln!(f)?;
        match (md.timestep, md.time_iterations()) {
            (Some(step), Some(iterations)) => {
                writeln!(f, "Timestep               : {}", format_duration(Duration::seconds(step)))?;
                writeln!(f, "N time iterations      : {}", iterations)?;
            }
            _ => {
                writeln!(f, "Timestep               : {}", format_duration(Duration::zero()))?;
                writeln!(f, "N time iterations      : No time integration")?;
            }
        }
        writeln!(f)?;

        section(f, "HORIZONTAL GEOMETRY")?;
        writeln!(f, "Points of C+I in X      : {}", md.nx)?;
        writeln!(f, "Points of C+I in Y      : {}", md.ny)?;
        writeln!(f)?;
        let projection = md.projection.as_ref();
        writeln!(
            f,
            "Kind of projection      : {}",
            or_unknown(projection.map(|p| p.projection.clone()))
        )?;
        writeln!(f, "Reference lat (ELAT0)   : {}", or_unknown(projection.map(|p| p.lat_1)))?;
        writeln!(f, "Reference lon (ELON0)   : {}", or_unknown(projection.map(|p| p.lon_0)))?;
        writeln!(f, "Center lat              : {}", or_unknown(md.center_lat))?;
        writeln!(f, "Center lon              : {}", or_unknown(md.center_lon))?;
        writeln!(f)?;
        writeln!(f, "Resolution in X (m)     : {}", or_unknown(md.dx))?;
        writeln!(f, "Resolution in Y (m)     : {}", or_unknown(md.dy))?;
        writeln!(f)?;

        section(f, "VERTICAL GEOMETRY")?;
        writeln!(f, "N levels                : {}", md.nlev)?;
        writeln!(f, "Ref pressure            : {}", or_unknown(md.refpressure))?;
        writeln!(f)?;
        writeln!(f, "Vert coords A           :")?;
        writeln!(f, "{:?}", md.a_list)?;
        writeln!(f)?;
        writeln!(f, "Vert coords B           :")?;
        writeln!(f, "{:?}", md.b_list)?;
        writeln!(f)?;

        section(f, "FIELDS")?;
        let nfields = md.nfields.unwrap_or(self.source.records().len() as i64);
        writeln!(f, "Number of fields        : {}", nfields)?;
        writeln!(f)?;

        self.write_tables(f)
    }
}

/// Render the report for `source`.
pub fn describe(source: &FaSource) -> String {
    FaDescription::new(source).to_string()
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let bar = "#".repeat(23);
    writeln!(f, "{}", bar)?;
    writeln!(f, "## {}", title)?;
    writeln!(f, "{}", bar)?;
    writeln!(f)
}

fn or_unknown<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| v.to_string())
}

/// `H:MM:SS`, prefixed with the number of days when at least one.
fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let hms = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => format!("{}{}", sign, hms),
        1 => format!("{}1 day, {}", sign, hms),
        n => format!("{}{} days, {}", sign, n, hms),
    }
}
