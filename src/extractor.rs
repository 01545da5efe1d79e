use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};

use crate::{AppError, Result};

// Structural markers for the targeted page layout. The price renders its
// whole and fractional currency digits as separate text nodes, so both
// parts are located independently and reassembled.
const TITLE_SELECTOR: &str = "#productTitle";
const PRICE_WHOLE_SELECTOR: &str = "span.a-price-whole";
const PRICE_FRACTION_SELECTOR: &str = "span.a-price-fraction";

/// One poll's parsed result. Not retained after the cycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedListing {
    pub title: String,
    pub price: Decimal,
}

/// Extracts (title, price) from raw page content using fixed,
/// layout-specific markers.
pub struct PriceExtractor {
    title: Selector,
    price_whole: Selector,
    price_fraction: Selector,
    non_digits: Regex,
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceExtractor {
    pub fn new() -> Self {
        PriceExtractor {
            title: Selector::parse(TITLE_SELECTOR).unwrap(),
            price_whole: Selector::parse(PRICE_WHOLE_SELECTOR).unwrap(),
            price_fraction: Selector::parse(PRICE_FRACTION_SELECTOR).unwrap(),
            non_digits: Regex::new(r"\D+").unwrap(),
        }
    }

    pub fn extract(&self, page: &str) -> Result<ExtractedListing> {
        let document = Html::parse_document(page);

        let title = self.select_text(&document, &self.title, TITLE_SELECTOR)?;
        let whole_text = self.select_text(&document, &self.price_whole, PRICE_WHOLE_SELECTOR)?;
        let fraction_text =
            self.select_text(&document, &self.price_fraction, PRICE_FRACTION_SELECTOR)?;

        let whole = self.digits_to_u64(&whole_text)?;
        // Zero-fill the fraction to two chars before stripping, so a
        // single-digit "5" reads as five cents
        let fraction = self.digits_to_u64(&format!("{:0>2}", fraction_text))?;

        // Lossless two-part reconstruction: cents with scale 2. Checked
        // arithmetic: the digits come from untrusted page text, and an
        // out-of-range price must skip the cycle, not wrap or panic.
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .and_then(|c| i64::try_from(c).ok())
            .ok_or_else(|| AppError::Parse {
                message: format!("price out of range: {}.{:02}", whole, fraction),
            })?;
        let price = Decimal::new(cents, 2);

        Ok(ExtractedListing { title, price })
    }

    fn select_text(&self, document: &Html, selector: &Selector, name: &str) -> Result<String> {
        let element = document
            .select(selector)
            .next()
            .ok_or_else(|| AppError::ElementNotFound {
                selector: name.to_string(),
            })?;
        Ok(element.text().collect::<Vec<_>>().join(" ").trim().to_string())
    }

    /// Strip all non-digit characters (thousands separators, currency
    /// symbols, whitespace) and parse what remains.
    fn digits_to_u64(&self, text: &str) -> Result<u64> {
        let digits = self.non_digits.replace_all(text, "");
        digits.parse::<u64>().map_err(|_| AppError::Parse {
            message: format!("no digits in price fragment {:?}", text),
        })
    }
}
