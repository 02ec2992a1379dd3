use csv::Writer;
use std::path::Path;

use super::write_failed;
use crate::error::Result;
use crate::metrics::Metric;
use crate::output::{AlertSystemRow, AllTimeMetricsRow, SquadAvailabilityRow};

fn open_writer(path: &Path) -> Result<Writer<std::fs::File>> {
    let file = std::fs::File::create(path).map_err(|e| write_failed(path, e))?;
    Ok(Writer::from_writer(file))
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Export `all_time_metrics` rows, one column per tracked metric
pub fn export_all_time_metrics<P: AsRef<Path>>(
    rows: &[AllTimeMetricsRow],
    output_path: P,
) -> Result<usize> {
    let path = output_path.as_ref();
    let mut writer = open_writer(path)?;

    let mut header = vec!["team_id", "athlete_id", "date"];
    header.extend(Metric::TRACKED.iter().map(|m| m.column()));
    header.extend(["sleep_start", "sleep_end"]);
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.team_id.to_string(), row.athlete_id.to_string(), row.date.clone()];
        record.extend(Metric::TRACKED.iter().map(|m| optional(row.values.get(*m))));
        record.push(row.sleep_start.clone().unwrap_or_default());
        record.push(row.sleep_end.clone().unwrap_or_default());
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| write_failed(path, e))?;
    Ok(rows.len())
}

/// Export `alert_system` baselines, four columns per tracked metric
pub fn export_alert_system<P: AsRef<Path>>(rows: &[AlertSystemRow], output_path: P) -> Result<usize> {
    let path = output_path.as_ref();
    let mut writer = open_writer(path)?;

    let mut header = vec!["team_id".to_string(), "athlete_id".to_string()];
    for metric in Metric::TRACKED {
        header.push(format!("{}_three_month_mean", metric.column()));
        header.push(format!("{}_three_month_std_dev", metric.column()));
        header.push(format!("{}_all_time_mean", metric.column()));
        header.push(format!("{}_all_time_std_dev", metric.column()));
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.team_id.to_string(), row.athlete_id.to_string()];
        for metric in Metric::TRACKED {
            let stats = row.baselines.get(metric);
            record.push(stats.three_month_mean.to_string());
            record.push(stats.three_month_std_dev.to_string());
            record.push(stats.all_time_mean.to_string());
            record.push(stats.all_time_std_dev.to_string());
        }
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| write_failed(path, e))?;
    Ok(rows.len())
}

/// Export `recovery_squad_availability` rows
pub fn export_availability<P: AsRef<Path>>(
    rows: &[SquadAvailabilityRow],
    output_path: P,
) -> Result<usize> {
    let path = output_path.as_ref();
    let mut writer = open_writer(path)?;

    writer.write_record(["team_id", "athlete_id", "period", "value"])?;
    for row in rows {
        writer.write_record([
            row.team_id.to_string(),
            row.athlete_id.to_string(),
            row.period.as_str().to_string(),
            row.value.to_string(),
        ])?;
    }

    writer.flush().map_err(|e| write_failed(path, e))?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityPeriod;
    use crate::output::TrackedValues;
    use crate::stats::BaselineStats;
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_all_time_metrics() {
        let temp_file = NamedTempFile::new().unwrap();
        let rows = vec![AllTimeMetricsRow {
            team_id: 1,
            athlete_id: 2,
            date: "2025-01-07T00:00:00.000Z".to_string(),
            values: TrackedValues::from_fn(|m| if m == Metric::Recovery { Some(66.0) } else { None }),
            sleep_start: Some("2025-01-06T22:30:00.000Z".to_string()),
            sleep_end: None,
        }];

        let written = export_all_time_metrics(&rows, temp_file.path()).unwrap();
        assert_eq!(written, 1);

        let mut reader = csv::Reader::from_path(temp_file.path()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 3 + 10 + 2);
        assert_eq!(&headers[3], "recovery");

        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[3], "66");
        assert_eq!(&record[4], "");
        assert_eq!(&record[13], "2025-01-06T22:30:00.000Z");
    }

    #[test]
    fn test_export_alert_system() {
        let temp_file = NamedTempFile::new().unwrap();
        let stats = BaselineStats {
            three_month_mean: 60.5,
            three_month_std_dev: 4.2,
            all_time_mean: 58.0,
            all_time_std_dev: 6.1,
        };
        let rows = vec![AlertSystemRow {
            team_id: 1,
            athlete_id: 2,
            baselines: TrackedValues::from_fn(|_| stats),
        }];

        export_alert_system(&rows, temp_file.path()).unwrap();

        let mut reader = csv::Reader::from_path(temp_file.path()).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 2 + 40);
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], "60.5");
        assert_eq!(&record[5], "6.1");
    }

    #[test]
    fn test_export_availability() {
        let temp_file = NamedTempFile::new().unwrap();
        let rows = vec![SquadAvailabilityRow {
            team_id: 1,
            athlete_id: 2,
            period: AvailabilityPeriod::Last7Days,
            value: 3,
        }];

        export_availability(&rows, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "team_id,athlete_id,period,value\n1,2,last7Days,3\n");
    }
}
