use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ErrorCode};
use crate::models::catalog::{
    CatalogSeed, Category, OptionDetails, Product, ProductOption, UserProfile,
};

/// Category, product, option and user directory
#[derive(Clone, Default)]
pub struct Catalog {
    categories: Arc<DashMap<i64, Category>>,
    products: Arc<DashMap<i64, Product>>,
    options: Arc<DashMap<i64, ProductOption>>,
    users: Arc<DashMap<i64, UserProfile>>,
}

impl Catalog {
    /// Seed from `path` when given, otherwise from the built-in demo catalog
    pub fn load(path: Option<&str>) -> Result<Self> {
        let seed = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read catalog seed {}", path))?;
                serde_json::from_str::<CatalogSeed>(&raw)
                    .with_context(|| format!("Invalid catalog seed {}", path))?
            }
            None => demo_seed(),
        };
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: CatalogSeed) -> Result<Self> {
        let catalog = Self::default();
        for category in seed.categories {
            catalog.categories.insert(category.id, category);
        }
        for product in seed.products {
            if !catalog.categories.contains_key(&product.category_id) {
                return Err(anyhow!(
                    "Product {} references unknown category {}",
                    product.id,
                    product.category_id
                ));
            }
            catalog.products.insert(product.id, product);
        }
        for option in seed.options {
            if !catalog.products.contains_key(&option.product_id) {
                return Err(anyhow!(
                    "Option {} references unknown product {}",
                    option.id,
                    option.product_id
                ));
            }
            catalog.options.insert(option.id, option);
        }

        info!(
            categories = catalog.categories.len(),
            products = catalog.products.len(),
            options = catalog.options.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn option_exists(&self, option_id: i64) -> bool {
        self.options.contains_key(&option_id)
    }

    pub fn ensure_option(&self, option_id: i64) -> Result<(), ApiError> {
        if self.option_exists(option_id) {
            Ok(())
        } else {
            Err(ApiError::with_details(
                ErrorCode::ProductOptionNotFound,
                ErrorCode::ProductOptionNotFound.message(),
                format!("productOptionId: {}", option_id),
            ))
        }
    }

    pub fn option_details(&self, option_id: i64) -> Option<OptionDetails> {
        let option = self.options.get(&option_id)?.clone();
        let product = self.products.get(&option.product_id)?.clone();
        let category = self.categories.get(&product.category_id)?.clone();
        Some(OptionDetails {
            option,
            product,
            category,
        })
    }

    /// "Product name (size)" for messages, falling back to the option id
    pub fn option_label(&self, option_id: i64) -> String {
        self.option_details(option_id)
            .map(|d| format!("{} ({})", d.product.name, d.option.size))
            .unwrap_or_else(|| format!("option #{}", option_id))
    }

    pub fn option_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.options.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn upsert_user(&self, id: i64, name: &str, role: &str) {
        self.users
            .entry(id)
            .and_modify(|u| {
                if u.name != name || u.role != role {
                    u.name = name.to_string();
                    u.role = role.to_string();
                }
            })
            .or_insert_with(|| UserProfile {
                id,
                name: name.to_string(),
                role: role.to_string(),
            });
    }

    pub fn user_name(&self, id: i64) -> String {
        self.users
            .get(&id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| format!("user-{}", id))
    }
}

fn demo_seed() -> CatalogSeed {
    let category = |id, name: &str| Category {
        id,
        name: name.to_string(),
    };
    let product = |id, name: &str, category_id| Product {
        id,
        name: name.to_string(),
        category_id,
    };
    let option = |id, product_id, size: &str| ProductOption {
        id,
        product_id,
        size: size.to_string(),
    };

    CatalogSeed {
        categories: vec![category(1, "Sneakers"), category(2, "Apparel")],
        products: vec![
            product(1, "Air Jordan 1 Retro High OG", 1),
            product(2, "Dunk Low Panda", 1),
            product(3, "Box Logo Hoodie", 2),
        ],
        options: vec![
            option(1, 1, "250"),
            option(2, 1, "260"),
            option(3, 1, "270"),
            option(4, 2, "260"),
            option(5, 2, "270"),
            option(6, 3, "M"),
            option(7, 3, "L"),
        ],
    }
}
