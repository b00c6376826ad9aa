use crate::types::{AlertRule, AlertType, FiredAlert};

/// Human-readable condition, e.g. "Price above 75.0%" or "24h change below -5.0%".
pub fn alert_message(rule: &AlertRule) -> String {
    match rule.rule_type {
        AlertType::PriceAbove => format!("Price above {}", format_probability(rule.threshold)),
        AlertType::PriceBelow => format!("Price below {}", format_probability(rule.threshold)),
        AlertType::ChangeAbove => format!("24h change above {}", format_change(rule.threshold)),
        AlertType::ChangeBelow => format!("24h change below {}", format_change(rule.threshold)),
    }
}

/// Price as a percentage of 1.0, clamped to [0, 100].
fn format_probability(value: f64) -> String {
    format!("{:.1}%", value.clamp(0.0, 1.0) * 100.0)
}

/// Change as a signed percentage; negatives keep their `-`.
fn format_change(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

impl FiredAlert {
    pub fn title(&self) -> String {
        format!("Alert: {}", self.market.title)
    }

    pub fn message(&self) -> String {
        alert_message(&self.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Market;

    fn rule(rule_type: AlertType, threshold: f64) -> AlertRule {
        AlertRule::new("M1", "polymarket", rule_type, threshold)
    }

    #[test]
    fn price_rules_render_as_probability() {
        assert_eq!(alert_message(&rule(AlertType::PriceAbove, 0.75)), "Price above 75.0%");
        assert_eq!(alert_message(&rule(AlertType::PriceBelow, 0.125)), "Price below 12.5%");
        assert_eq!(alert_message(&rule(AlertType::PriceAbove, 1.4)), "Price above 100.0%");
    }

    #[test]
    fn change_rules_render_signed_percentage() {
        assert_eq!(alert_message(&rule(AlertType::ChangeAbove, 0.05)), "24h change above 5.0%");
        assert_eq!(alert_message(&rule(AlertType::ChangeBelow, -0.05)), "24h change below -5.0%");
    }

    #[test]
    fn fired_alert_title_uses_market_title() {
        let fired = FiredAlert {
            market: Market {
                platform: "polymarket".to_string(),
                id: "M1".to_string(),
                title: "Will X happen".to_string(),
                description: None,
                yes_price: Some(0.8),
                price_change_24h: None,
            },
            rule: rule(AlertType::PriceAbove, 0.75),
        };
        assert_eq!(fired.title(), "Alert: Will X happen");
        assert_eq!(fired.message(), "Price above 75.0%");
    }
}
