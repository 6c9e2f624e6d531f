use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::shared_data::{SimulationReport, SpeedResult};
use crate::simulation_engine::weather::WeatherKind;

/// One row per vehicle that left the road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedResultRecord {
    pub lane: String,
    pub vehicle: u64,
    pub average_speed: f64,
    pub speed_trap_speed: Option<f64>,
    /// `weather:speed` pairs in journey order, `;`-separated.
    pub weather_segments: String,
    pub collided: bool,
    pub collision_weather: Option<WeatherKind>,
    pub exit_weather: WeatherKind,
}

impl From<&SpeedResult> for SpeedResultRecord {
    fn from(result: &SpeedResult) -> Self {
        let weather_segments = result
            .weather_segments
            .iter()
            .map(|s| format!("{}:{:.2}", s.weather, s.speed))
            .collect::<Vec<_>>()
            .join(";");
        SpeedResultRecord {
            lane: result.vehicle.lane.to_string(),
            vehicle: result.vehicle.seq,
            average_speed: result.average_speed,
            speed_trap_speed: result.speed_trap_speed,
            weather_segments,
            collided: result.collided,
            collision_weather: result.collision_weather,
            exit_weather: result.exit_weather,
        }
    }
}

/// Per-weather totals across the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummaryRecord {
    pub weather: WeatherKind,
    pub exited: u64,
    pub collisions: u64,
    /// Mean of all segment speeds driven under this weather; empty when none.
    pub mean_segment_speed: Option<f64>,
}

pub fn weather_summary(report: &SimulationReport) -> Vec<WeatherSummaryRecord> {
    WeatherKind::ALL
        .iter()
        .map(|&weather| {
            let speeds: Vec<f64> = report
                .speed_results
                .iter()
                .flat_map(|r| r.speeds_in(weather))
                .collect();
            let mean_segment_speed = if speeds.is_empty() {
                None
            } else {
                Some(speeds.iter().sum::<f64>() / speeds.len() as f64)
            };
            WeatherSummaryRecord {
                weather,
                exited: report.exited_by_weather.get(&weather).copied().unwrap_or(0),
                collisions: report.collisions_by_weather.get(&weather).copied().unwrap_or(0),
                mean_segment_speed,
            }
        })
        .collect()
}

fn write_csv<W: Write, T: Serialize>(writer: W, records: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_speed_results<W: Write>(
    writer: W,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    let records: Vec<SpeedResultRecord> = report.speed_results.iter().map(Into::into).collect();
    write_csv(writer, &records)
}

pub fn write_weather_summary<W: Write>(
    writer: W,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    write_csv(writer, &weather_summary(report))
}

pub fn write_report_json<W: Write>(
    writer: W,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Writes the per-vehicle results to a fresh CSV file at `path`.
pub fn export_speed_results(
    path: impl AsRef<Path>,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    write_speed_results(BufWriter::new(file), report)
}

pub fn export_weather_summary(
    path: impl AsRef<Path>,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    write_weather_summary(BufWriter::new(file), report)
}

pub fn export_report_json(
    path: impl AsRef<Path>,
    report: &SimulationReport,
) -> Result<(), Box<dyn Error>> {
    let mut out = BufWriter::new(File::create(path)?);
    write_report_json(&mut out, report)?;
    out.flush()?;
    Ok(())
}

/// Reads speed-result rows back, e.g. for a follow-up analysis.
pub fn read_speed_results<R: Read>(reader: R) -> Result<Vec<SpeedResultRecord>, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for record in rdr.deserialize() {
        records.push(record?);
    }
    Ok(records)
}
