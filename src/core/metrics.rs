use super::types::{SimulationResult, Summary};

const DAYS_PER_YEAR: f64 = 365.25;

pub fn total_return(exit_value: f64, invested: f64) -> Option<f64> {
    if invested <= 0.0 {
        return None;
    }
    Some((exit_value - invested) / invested)
}

/// Geometric mean yearly return matching a total return over `years`.
pub fn annualized_return(total_return: f64, years: f64) -> Option<f64> {
    if years <= 0.0 || total_return <= -1.0 {
        return None;
    }
    Some((1.0 + total_return).powf(1.0 / years) - 1.0)
}

impl SimulationResult {
    pub fn summary(&self) -> Summary {
        let costs = self.costs();
        let (Some(first), Some(last)) = (self.points().first(), self.final_point()) else {
            return Summary {
                final_gross_value: 0.0,
                final_net_value: 0.0,
                total_contributions: 0.0,
                overflow_contributions: self.overflow_contributions(),
                total_return: None,
                annualized_return: None,
                costs,
            };
        };

        let years = (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR;
        let total = total_return(last.net_value, last.cumulative_contributions);
        Summary {
            final_gross_value: last.gross_value,
            final_net_value: last.net_value,
            total_contributions: last.cumulative_contributions,
            overflow_contributions: self.overflow_contributions(),
            total_return: total,
            annualized_return: total.and_then(|t| annualized_return(t, years)),
            costs,
        }
    }
}
