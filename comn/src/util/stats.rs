use std::collections::VecDeque;

/// Rolling window over the most recent samples.
#[derive(Debug, Clone)]
pub struct Var {
    max_num_samples: usize,
    recent_values: VecDeque<f32>,
}

impl Default for Var {
    fn default() -> Self {
        Var::new(100)
    }
}

impl Var {
    pub fn new(max_num_samples: usize) -> Self {
        Self {
            max_num_samples,
            recent_values: VecDeque::with_capacity(max_num_samples),
        }
    }

    pub fn record(&mut self, value: f32) {
        self.recent_values.push_back(value);

        if self.recent_values.len() > self.max_num_samples {
            self.recent_values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.recent_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent_values.is_empty()
    }

    pub fn clear(&mut self) {
        self.recent_values.clear();
    }

    pub fn mean(&self) -> Option<f32> {
        if self.recent_values.is_empty() {
            None
        } else {
            Some(self.recent_values.iter().sum::<f32>() / self.recent_values.len() as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_covers_only_recent_window() {
        let mut var = Var::new(2);
        assert_eq!(var.mean(), None);

        var.record(1.0);
        var.record(2.0);
        var.record(4.0);

        assert_eq!(var.len(), 2);
        assert_eq!(var.mean(), Some(3.0));

        var.clear();
        assert!(var.is_empty());
    }
}
