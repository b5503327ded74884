//! Built-in analysis kinds.

pub mod changelog;
pub mod cluster;
pub mod quality;
pub mod risk;
pub mod sentiment;

use std::collections::HashMap;

/// The `n` most frequent strings, ties broken by first appearance.
pub(crate) fn most_common<'a, I>(items: I, n: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, position)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(item, (count, first))| (item, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(n)
        .map(|(item, count, _)| (item.to_string(), count))
        .collect()
}

/// Arithmetic mean, `0.0` for an empty input.
pub(crate) fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_common_ties_keep_first_appearance() {
        let items = ["typo", "vague", "vague", "typo", "scope", "vague"];
        let top = most_common(items, 2);
        assert_eq!(top, vec![("vague".to_string(), 3), ("typo".to_string(), 2)]);

        let top = most_common(["b", "a", "a", "b", "c"], 3);
        assert_eq!(top[0].0, "b");
        assert_eq!(top[1].0, "a");
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_eq!(mean(Vec::new()), 0.0);
        assert_eq!(mean([1.0, 2.0, 6.0]), 3.0);
    }
}
