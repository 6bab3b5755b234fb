//! HTML extraction for search result and product pages.

use crate::config::SelectorConfig;
use crate::error::{AssistantError, Result};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use super::NOT_AVAILABLE;

static PRODUCT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pid=([A-Z0-9]+)").expect("product id regex is valid"));

/// Compiled CSS selectors and text markers for one site layout.
#[derive(Debug, Clone)]
pub struct PageSelectors {
    review_card: Selector,
    review_text: Selector,
    product_card: Selector,
    product_link: Selector,
    rating: Selector,
    div: Selector,
    span: Selector,
    price_marker: String,
    reviews_marker: String,
    review_count: Regex,
}

fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AssistantError::InvalidConfig(format!("Bad selector '{}': {}", css, e)))
}

impl PageSelectors {
    pub fn compile(config: &SelectorConfig) -> Result<Self> {
        let review_count = Regex::new(&format!(
            r"(\d+(?:,\d+)?)\s+{}",
            regex::escape(&config.reviews_marker)
        ))
        .map_err(|e| AssistantError::InvalidConfig(format!("Bad reviews marker: {}", e)))?;

        Ok(Self {
            review_card: compile(&config.review_card)?,
            review_text: compile(&config.review_text)?,
            product_card: compile(&config.product_card)?,
            product_link: compile(&config.product_link)?,
            rating: compile(&config.rating)?,
            div: compile("div")?,
            span: compile("span")?,
            price_marker: config.price_marker.clone(),
            reviews_marker: config.reviews_marker.clone(),
            review_count,
        })
    }
}

/// Stripped text pieces of `element` joined by `separator`.
fn joined_text(element: ElementRef<'_>, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Text of an element that wraps a single string, descending through
/// single-child elements. `None` when the element has mixed content.
fn sole_string(element: ElementRef<'_>) -> Option<String> {
    let mut children = element.children();
    let child = children.next()?;
    if children.next().is_some() {
        return None;
    }

    match child.value() {
        Node::Text(text) => Some(String::from(&**text)),
        Node::Element(_) => ElementRef::wrap(child).and_then(sole_string),
        _ => None,
    }
}

/// First element under `scope` matching `selector` whose sole string
/// contains `marker`.
fn find_with_marker<'a>(
    scope: ElementRef<'a>,
    selector: &Selector,
    marker: &str,
) -> Option<(ElementRef<'a>, String)> {
    scope.select(selector).find_map(|el| {
        sole_string(el)
            .filter(|s| s.contains(marker))
            .map(|s| (el, s))
    })
}

fn or_not_available(value: String) -> String {
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value
    }
}

/// Up to `count` distinct review texts from a product page, in page order.
pub fn extract_reviews(html: &str, selectors: &PageSelectors, count: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut reviews = Vec::new();

    for card in document.select(&selectors.review_card) {
        if reviews.len() >= count {
            break;
        }
        let Some(text_node) = card.select(&selectors.review_text).next() else {
            continue;
        };

        let text = joined_text(text_node, " ");
        if !text.is_empty() && seen.insert(text.clone()) {
            reviews.push(text);
        }
    }

    reviews
}

/// Fields read off one search result card.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCard {
    pub product_id: String,
    pub title: String,
    pub rating: String,
    pub total_reviews: String,
    pub price: String,
    pub link: String,
}

/// Parse every product card on a search results page.
///
/// Cards without a link yield `Ok(None)`; cards whose link cannot be
/// resolved yield an error. Either way the remaining cards are unaffected.
pub fn parse_product_cards(
    html: &str,
    selectors: &PageSelectors,
    base: &Url,
) -> Vec<Result<Option<ProductCard>>> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.product_card)
        .map(|card| parse_card(card, selectors, base))
        .collect()
}

fn parse_card(
    card: ElementRef<'_>,
    selectors: &PageSelectors,
    base: &Url,
) -> Result<Option<ProductCard>> {
    let Some(anchor) = card.select(&selectors.product_link).next() else {
        return Ok(None);
    };
    let href = anchor.value().attr("href").unwrap_or_default();

    let link = if href.starts_with("http") {
        Url::parse(href)
    } else {
        base.join(href)
    }
    .map_err(|e| AssistantError::Scrape(format!("Bad product link '{}': {}", href, e)))?;
    let link = link.to_string();

    let product_id = PRODUCT_ID
        .captures(&link)
        .and_then(|c| c.get(1))
        .map_or_else(|| NOT_AVAILABLE.to_string(), |m| m.as_str().to_string());

    let title = or_not_available(joined_text(anchor, " "));

    let price = find_with_marker(card, &selectors.div, &selectors.price_marker)
        .map(|(el, _)| or_not_available(joined_text(el, "")))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let rating = card
        .select(&selectors.rating)
        .next()
        .map(|el| or_not_available(joined_text(el, "")))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let total_reviews = find_with_marker(card, &selectors.span, &selectors.reviews_marker)
        .and_then(|(_, text)| {
            selectors
                .review_count
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Ok(Some(ProductCard {
        product_id,
        title,
        rating,
        total_reviews,
        price,
        link,
    }))
}
