//! Aggregate accumulators stepped once per input row and reduced per group.

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::error::{ExecError, Result};
use crate::query::record::{Entry, NULL_MARKER};
use crate::query::value::FieldData;

/// Supported aggregate functions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AggFunc {
    /// `sum(x)`
    Sum,
    /// `avg(x)`
    Avg,
    /// `max(x)`
    Max,
    /// `min(x)`
    Min,
    /// `count(x)`, skipping nulls.
    Count,
    /// `count(*)`, counting rows.
    CountStar,
    /// `collect(x)`
    Collect,
    /// `percentileCont(x, p)`
    PercentileCont,
    /// `percentileDisc(x, p)`
    PercentileDisc,
    /// `stDev(x)`, sample standard deviation.
    StDev,
    /// `stDevP(x)`, population standard deviation.
    StDevP,
    /// `variance(x)`, sample variance.
    Variance,
    /// `varianceP(x)`, population variance.
    VarianceP,
}

impl AggFunc {
    /// Resolves a case-insensitive function name.
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_lowercase().as_str() {
            "sum" => AggFunc::Sum,
            "avg" => AggFunc::Avg,
            "max" => AggFunc::Max,
            "min" => AggFunc::Min,
            "count" => AggFunc::Count,
            "collect" => AggFunc::Collect,
            "percentilecont" => AggFunc::PercentileCont,
            "percentiledisc" => AggFunc::PercentileDisc,
            "stdev" => AggFunc::StDev,
            "stdevp" => AggFunc::StDevP,
            "variance" => AggFunc::Variance,
            "variancep" => AggFunc::VarianceP,
            _ => return None,
        };
        Some(func)
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::Count | AggFunc::CountStar => "count",
            AggFunc::Collect => "collect",
            AggFunc::PercentileCont => "percentileCont",
            AggFunc::PercentileDisc => "percentileDisc",
            AggFunc::StDev => "stDev",
            AggFunc::StDevP => "stDevP",
            AggFunc::Variance => "variance",
            AggFunc::VarianceP => "varianceP",
        }
    }

    /// Number of value arguments expected (excluding `count(*)`'s none).
    pub fn arity(self) -> usize {
        match self {
            AggFunc::CountStar => 0,
            AggFunc::PercentileCont | AggFunc::PercentileDisc => 2,
            _ => 1,
        }
    }

    fn keeps_samples(self) -> bool {
        matches!(
            self,
            AggFunc::PercentileCont
                | AggFunc::PercentileDisc
                | AggFunc::StDev
                | AggFunc::StDevP
                | AggFunc::Variance
                | AggFunc::VarianceP
        )
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running state of one aggregate within one group.
#[derive(Clone, Debug)]
pub struct Accumulator {
    func: AggFunc,
    distinct: bool,
    seen: FxHashSet<String>,
    count: u64,
    int_sum: i64,
    float_sum: f64,
    all_int: bool,
    best: Option<FieldData>,
    items: Vec<FieldData>,
    samples: Vec<f64>,
    percentile: Option<f64>,
    result: FieldData,
}

impl Accumulator {
    /// Fresh accumulator.
    pub fn new(func: AggFunc, distinct: bool) -> Self {
        Self {
            func,
            distinct,
            seen: FxHashSet::default(),
            count: 0,
            int_sum: 0,
            float_sum: 0.0,
            all_int: true,
            best: None,
            items: Vec::new(),
            samples: Vec::new(),
            percentile: None,
            result: FieldData::Null,
        }
    }

    /// Function this accumulator computes.
    pub fn func(&self) -> AggFunc {
        self.func
    }

    /// Drops all accumulated state.
    pub fn reset(&mut self) {
        *self = Self::new(self.func, self.distinct);
    }

    /// Reduced value; `Null` until [`Accumulator::reduce`] runs.
    pub fn result(&self) -> &FieldData {
        &self.result
    }

    /// Feeds one row. `args` holds the evaluated value arguments.
    pub fn step(&mut self, args: &[Entry]) -> Result<()> {
        if self.func == AggFunc::CountStar {
            self.count += 1;
            return Ok(());
        }
        let value = args
            .first()
            .ok_or_else(|| ExecError::argument(self.func.name(), "missing argument"))?;
        if value.equal_null() {
            return Ok(());
        }
        if self.distinct && !self.seen.insert(value.render(NULL_MARKER)) {
            return Ok(());
        }
        match self.func {
            AggFunc::CountStar => {}
            AggFunc::Count => self.count += 1,
            AggFunc::Collect => self.items.push(collectable(value)),
            AggFunc::Sum | AggFunc::Avg => {
                let number = numeric(self.func, value)?;
                self.count += 1;
                match number {
                    FieldData::Int(v) if self.all_int => match self.int_sum.checked_add(v) {
                        Some(sum) => self.int_sum = sum,
                        None => {
                            self.all_int = false;
                            self.float_sum = self.int_sum as f64 + v as f64;
                        }
                    },
                    other => {
                        if self.all_int {
                            self.all_int = false;
                            self.float_sum = self.int_sum as f64;
                        }
                        self.float_sum += other.as_float().unwrap_or_default();
                    }
                }
            }
            AggFunc::Max | AggFunc::Min => {
                let candidate = value
                    .as_constant()
                    .ok_or_else(|| {
                        ExecError::argument(self.func.name(), format!("cannot order {}", value.kind_name()))
                    })?
                    .clone();
                let wanted = if self.func == AggFunc::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                let replace = match &self.best {
                    None => true,
                    Some(best) => candidate.total_cmp(best) == wanted,
                };
                if replace {
                    self.best = Some(candidate);
                }
            }
            AggFunc::PercentileCont
            | AggFunc::PercentileDisc
            | AggFunc::StDev
            | AggFunc::StDevP
            | AggFunc::Variance
            | AggFunc::VarianceP => {
                if self.percentile.is_none() && matches!(self.func, AggFunc::PercentileCont | AggFunc::PercentileDisc) {
                    let p = args
                        .get(1)
                        .and_then(Entry::as_constant)
                        .and_then(FieldData::as_float)
                        .ok_or_else(|| ExecError::argument(self.func.name(), "percentile must be numeric"))?;
                    if !(0.0..=1.0).contains(&p) {
                        return Err(ExecError::argument(
                            self.func.name(),
                            "percentile must be a number in the range 0.0 to 1.0",
                        ));
                    }
                    self.percentile = Some(p);
                }
                let number = numeric(self.func, value)?;
                self.samples.push(number.as_float().unwrap_or_default());
            }
        }
        Ok(())
    }

    /// Finalizes the accumulated state into [`Accumulator::result`].
    pub fn reduce(&mut self) -> Result<()> {
        self.result = match self.func {
            AggFunc::Count | AggFunc::CountStar => FieldData::Int(self.count as i64),
            AggFunc::Sum if self.all_int => FieldData::Int(self.int_sum),
            AggFunc::Sum => FieldData::Float(self.float_sum),
            AggFunc::Avg if self.count == 0 => FieldData::Null,
            AggFunc::Avg => {
                let total = if self.all_int {
                    self.int_sum as f64
                } else {
                    self.float_sum
                };
                FieldData::Float(total / self.count as f64)
            }
            AggFunc::Max | AggFunc::Min => self.best.clone().unwrap_or(FieldData::Null),
            AggFunc::Collect => FieldData::Array(self.items.clone()),
            func if func.keeps_samples() => self.reduce_samples(),
            _ => FieldData::Null,
        };
        Ok(())
    }

    fn reduce_samples(&mut self) -> FieldData {
        let n = self.samples.len();
        match self.func {
            AggFunc::PercentileCont | AggFunc::PercentileDisc => {
                if n == 0 {
                    return FieldData::Null;
                }
                self.samples.sort_by(f64::total_cmp);
                let p = self.percentile.unwrap_or(0.0);
                if self.func == AggFunc::PercentileDisc {
                    let idx = if p > 0.0 {
                        ((p * n as f64).ceil() as usize).saturating_sub(1)
                    } else {
                        0
                    };
                    return FieldData::Float(self.samples[idx.min(n - 1)]);
                }
                if p == 1.0 || n == 1 {
                    return FieldData::Float(self.samples[n - 1]);
                }
                let position = p * (n - 1) as f64;
                let index = position.trunc() as usize;
                let fraction = position.fract();
                if fraction == 0.0 {
                    return FieldData::Float(self.samples[index]);
                }
                FieldData::Float(
                    self.samples[index] * (1.0 - fraction) + self.samples[index + 1] * fraction,
                )
            }
            _ => {
                let sampled = matches!(self.func, AggFunc::StDev | AggFunc::Variance);
                if n < 2 {
                    return FieldData::Float(0.0);
                }
                let mean = self.samples.iter().sum::<f64>() / n as f64;
                let squares: f64 = self.samples.iter().map(|v| (v - mean) * (v - mean)).sum();
                let divisor = if sampled { n - 1 } else { n } as f64;
                let variance = squares / divisor;
                if matches!(self.func, AggFunc::StDev | AggFunc::StDevP) {
                    FieldData::Float(variance.sqrt())
                } else {
                    FieldData::Float(variance)
                }
            }
        }
    }
}

fn numeric(func: AggFunc, value: &Entry) -> Result<FieldData> {
    match value.as_constant() {
        Some(v) if v.is_numeric() => Ok(v.clone()),
        _ => Err(ExecError::argument(
            func.name(),
            format!("could not convert {} to a number", value.render(NULL_MARKER)),
        )),
    }
}

fn collectable(value: &Entry) -> FieldData {
    match value {
        Entry::Constant(v) => v.clone(),
        other => FieldData::String(other.render(NULL_MARKER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(func: AggFunc, distinct: bool, values: &[FieldData]) -> Result<FieldData> {
        let mut acc = Accumulator::new(func, distinct);
        for value in values {
            acc.step(&[Entry::Constant(value.clone())])?;
        }
        acc.reduce()?;
        Ok(acc.result().clone())
    }

    fn floats(values: &[f64]) -> Vec<FieldData> {
        values.iter().copied().map(FieldData::Float).collect()
    }

    #[test]
    fn sum_keeps_integer_type_and_skips_nulls() -> Result<()> {
        let values = [FieldData::Int(1), FieldData::Null, FieldData::Int(4)];
        assert_eq!(run(AggFunc::Sum, false, &values)?, FieldData::Int(5));
        assert_eq!(run(AggFunc::Avg, false, &values)?, FieldData::Float(2.5));
        assert_eq!(run(AggFunc::Count, false, &values)?, FieldData::Int(2));
        Ok(())
    }

    #[test]
    fn count_star_counts_rows() -> Result<()> {
        let mut acc = Accumulator::new(AggFunc::CountStar, false);
        acc.step(&[])?;
        acc.step(&[])?;
        acc.reduce()?;
        assert_eq!(acc.result(), &FieldData::Int(2));
        Ok(())
    }

    #[test]
    fn distinct_dedupes_by_rendering() -> Result<()> {
        let values = [FieldData::Int(1), FieldData::Int(1), FieldData::Int(2)];
        assert_eq!(run(AggFunc::Count, true, &values)?, FieldData::Int(2));
        assert_eq!(
            run(AggFunc::Collect, true, &values)?,
            FieldData::Array(vec![FieldData::Int(1), FieldData::Int(2)])
        );
        Ok(())
    }

    #[test]
    fn max_and_min_order_mixed_numbers() -> Result<()> {
        let values = [FieldData::Int(3), FieldData::Float(7.5), FieldData::Int(-1)];
        assert_eq!(run(AggFunc::Max, false, &values)?, FieldData::Float(7.5));
        assert_eq!(run(AggFunc::Min, false, &values)?, FieldData::Int(-1));
        assert_eq!(run(AggFunc::Max, false, &[])?, FieldData::Null);
        Ok(())
    }

    #[test]
    fn percentiles_interpolate_or_pick() -> Result<()> {
        let values = floats(&[10.0, 20.0, 30.0, 40.0]);
        let mut cont = Accumulator::new(AggFunc::PercentileCont, false);
        let mut disc = Accumulator::new(AggFunc::PercentileDisc, false);
        for value in &values {
            let args = [Entry::Constant(value.clone()), Entry::constant(0.5)];
            cont.step(&args)?;
            disc.step(&args)?;
        }
        cont.reduce()?;
        disc.reduce()?;
        assert_eq!(cont.result(), &FieldData::Float(25.0));
        assert_eq!(disc.result(), &FieldData::Float(20.0));
        Ok(())
    }

    #[test]
    fn spread_statistics() -> Result<()> {
        let values = floats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(run(AggFunc::StDevP, false, &values)?, FieldData::Float(2.0));
        assert_eq!(run(AggFunc::VarianceP, false, &values)?, FieldData::Float(4.0));
        assert_eq!(run(AggFunc::StDev, false, &floats(&[1.0]))?, FieldData::Float(0.0));
        Ok(())
    }

    #[test]
    fn percentile_out_of_range_is_rejected() {
        let mut acc = Accumulator::new(AggFunc::PercentileDisc, false);
        let err = acc
            .step(&[Entry::constant(1.0), Entry::constant(1.5)])
            .unwrap_err();
        assert_eq!(err.code(), "ARGUMENT_ERROR");
    }
}
