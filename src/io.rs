/*!
# Output Plumbing for Draws and Metrics

Draw records go out as CSV rows, one per draw: the log density under the
name `lp__` followed by the continuous parameter vector. Mass metrics
describe themselves through the [`MetricWriter`] contract: a comment line
naming the shape, then a named vector or matrix payload.
*/

use ndarray::{ArrayView1, ArrayView2};
use std::error::Error;
use std::io::Write;

/// Sink for mass-metric descriptions.
pub trait MetricWriter {
    /// A free-form annotation line.
    fn comment(&mut self, text: &str);

    /// A named vector payload.
    fn vector(&mut self, name: &str, values: &ArrayView1<f64>);

    /// A named matrix payload, written row by row.
    fn matrix(&mut self, name: &str, values: &ArrayView2<f64>);
}

/// [`MetricWriter`] over any byte sink: comments become `# `-prefixed lines,
/// payloads become `name,<comma-separated values>` rows.
pub struct StreamMetricWriter<W: Write> {
    out: W,
}

impl<W: Write> StreamMetricWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MetricWriter for StreamMetricWriter<W> {
    fn comment(&mut self, text: &str) {
        let _ = writeln!(self.out, "# {text}");
    }

    fn vector(&mut self, name: &str, values: &ArrayView1<f64>) {
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(self.out, "{name},{joined}");
    }

    fn matrix(&mut self, name: &str, values: &ArrayView2<f64>) {
        for row in values.rows() {
            let joined = row
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(self.out, "{name},{joined}");
        }
    }
}

/// Writes the draw-record header: `lp__` and one column per parameter.
pub fn write_draw_header<W: Write>(out: &mut W, dim: usize) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(out);
    let mut header = vec!["lp__".to_string()];
    header.extend((0..dim).map(|i| format!("param_{i}")));
    wtr.write_record(&header)?;
    wtr.flush()?;
    Ok(())
}

/// Appends one draw record: the log density, then the parameter vector.
pub fn write_draw<W: Write>(
    out: &mut W,
    lp: f64,
    params: &ArrayView1<f64>,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(out);
    let mut record = vec![lp.to_string()];
    record.extend(params.iter().map(|v| v.to_string()));
    wtr.write_record(&record)?;
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use ndarray::{arr1, arr2};

    #[test]
    fn draw_records_round_trip_through_csv() {
        let mut buf = Vec::new();
        write_draw_header(&mut buf, 2).unwrap();
        write_draw(&mut buf, -1.5, &arr1(&[0.25, -3.0]).view()).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("lp__,param_0,param_1"));
        assert_eq!(lines.next(), Some("-1.5,0.25,-3"));
    }

    #[test]
    fn diag_metric_writes_comment_and_vector() {
        let metric = Metric::diag(arr1(&[1.0, 100.0]));
        let mut writer = StreamMetricWriter::new(Vec::new());
        metric.write_metric(&mut writer);
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "# Diagonal elements of inverse mass matrix:\nM_inv,1,100\n"
        );
    }

    #[test]
    fn dense_metric_writes_every_row() {
        let metric = Metric::dense(arr2(&[[2.0, 0.5], [0.5, 1.0]]));
        let mut writer = StreamMetricWriter::new(Vec::new());
        metric.write_metric(&mut writer);
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "# Elements of inverse mass matrix:\nM_inv,2,0.5\nM_inv,0.5,1\n"
        );
    }

    #[test]
    fn unit_metric_writes_comment_only() {
        let metric = Metric::unit(3);
        let mut writer = StreamMetricWriter::new(Vec::new());
        metric.write_metric(&mut writer);
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "# No free parameters for unit metric\n");
    }
}
