//! Address-to-city resolution and the two-tier shipping fee.

use rust_decimal::Decimal;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::Config;

/// Lowercases and strips diacritics: canonical decomposition, then drop the
/// combining marks. "Hồ Chí Minh" becomes "ho chi minh".
pub fn normalize_address(address: &str) -> String {
    address
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Finds a known city inside a free-text address.
///
/// Matching is a substring test on the normalized address. When several city
/// names occur in the same address, the longest name wins and ties break
/// alphabetically, so overlapping names ("dong ha" vs "dong") resolve the
/// same way on every run.
pub fn resolve_city<'a>(address: &str, cities: &'a [String]) -> Option<&'a str> {
    let normalized = normalize_address(address);
    let mut ordered: Vec<&'a String> = cities.iter().collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    ordered
        .into_iter()
        .map(String::as_str)
        .find(|city| normalized.contains(&normalize_address(city)))
}

/// Flat fee by tier: an address in a known city ships cheap, everything else
/// (including an empty or unparseable address) pays the remote rate.
pub fn shipping_fee(address: &str, config: &Config) -> Decimal {
    match resolve_city(address, &config.known_cities) {
        Some(_) => config.shipping_fee_known,
        None => config.shipping_fee_unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn strips_diacritics_and_case() {
        assert_eq!(normalize_address("Hồ Chí Minh"), "ho chi minh");
        assert_eq!(normalize_address("Hà Nội"), "ha noi");
        assert_eq!(normalize_address("plain ascii"), "plain ascii");
    }

    #[test]
    fn resolves_city_inside_free_text() {
        let cities = cities(&["ha noi", "ho chi minh"]);
        assert_eq!(
            resolve_city("12 Nguyễn Huệ, Quận 1, Hồ Chí Minh", &cities),
            Some("ho chi minh")
        );
        assert_eq!(resolve_city("somewhere rural", &cities), None);
        assert_eq!(resolve_city("", &cities), None);
    }

    #[test]
    fn longest_city_name_wins_deterministically() {
        let cities = cities(&["dong", "dong ha"]);
        assert_eq!(resolve_city("23 Le Loi, Dong Ha", &cities), Some("dong ha"));
        // Equal lengths fall back to alphabetical order.
        let tied = self::cities(&["beta", "alfa"]);
        assert_eq!(resolve_city("border of beta and alfa", &tied), Some("alfa"));
    }

    #[test]
    fn fee_tiers() {
        let config = Config::default();
        assert_eq!(
            shipping_fee("Cầu Giấy, Hà Nội", &config),
            config.shipping_fee_known
        );
        assert_eq!(shipping_fee("", &config), config.shipping_fee_unknown);
        assert_eq!(
            shipping_fee("unknown village", &config),
            config.shipping_fee_unknown
        );
    }
}
