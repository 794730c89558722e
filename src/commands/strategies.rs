use crate::strategy::StrategyRegistry;
use anyhow::Result;

/// One block per strategy: name, description and declared candidates.
pub fn describe(registry: &StrategyRegistry) -> Result<String> {
    let mut out = String::new();
    for strategy in registry.iter() {
        let grid = strategy.declared_grid()?;
        out.push_str(&format!(
            "{} ({} combination(s))\n",
            strategy.name(),
            grid.combination_count()
        ));
        if !strategy.description().is_empty() {
            out.push_str(&format!("  {}\n", strategy.description()));
        }
        for (name, values) in grid.axes() {
            let candidates: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            out.push_str(&format!("    {} = [{}]\n", name, candidates.join(", ")));
        }
    }
    Ok(out)
}

pub fn run(registry: &StrategyRegistry) -> Result<()> {
    print!("{}", describe(registry)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_registered_strategy_with_its_grid() {
        let text = describe(&StrategyRegistry::with_builtin()).unwrap();
        assert!(text.contains("liquidation_heatmap (2 combination(s))"));
        assert!(text.contains("rci (12 combination(s))"));
        assert!(text.contains("    ma_type = [SMA, EMA]"));
    }
}
