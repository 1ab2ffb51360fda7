//! Column descriptions of the retail table

use std::sync::OnceLock;

use serde_json::{Map, Value};

/// Column name and meaning, in table order
pub const COLUMN_DESCRIPTIONS: [(&str, &str); 13] = [
    ("Period", "The time period for the data entry (example: 'Jan-21')"),
    ("City", "The city where the data was collected (example: 'Abidjan')"),
    ("Channel", "The sales channel (example: 'Boutique')"),
    ("Category", "The product category (example: 'PASTA')"),
    ("Segment", "The segment within the category (example: 'DRY PASTA')"),
    ("Manufacturer", "The manufacturer of the product (example: 'CAPRA')"),
    ("Brand", "The brand of the product (example: 'ALYSSA')"),
    ("Item Name", "The name of the item (example: 'ALYSSA SPAGHETTI 200G SACHET')"),
    ("Pack_Size", "The size of the product packaging (example: '200G')"),
    ("Packaging", "The type of packaging (example: 'SACHET')"),
    ("Unit_Price", "The price per unit of the product (example: '89.06')"),
    ("Sales_Volume(KG_LTRS)", "The sales volume in kilograms or liters (example: '66,795.7')"),
    ("Sales_Value", "The total sales value (example: '21,286,480.6')"),
];

static RENDERED: OnceLock<String> = OnceLock::new();

/// JSON object of the descriptions, keys in table order. Built once.
pub fn columns_descriptions() -> &'static str {
    RENDERED.get_or_init(|| {
        let map: Map<String, Value> = COLUMN_DESCRIPTIONS
            .iter()
            .map(|(name, description)| ((*name).to_string(), Value::from(*description)))
            .collect();
        Value::Object(map).to_string()
    })
}
