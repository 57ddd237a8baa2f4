//! Validation utilities for the Warehouse Management Platform

// ============================================================================
// Inventory Validations
// ============================================================================

/// Maximum length of a product name (matches the database column)
pub const MAX_PRODUCT_NAME: usize = 120;
/// Maximum length of a product brand
pub const MAX_PRODUCT_BRAND: usize = 80;
/// Maximum length of a purchase order number
pub const MAX_ORDER_NUMBER: usize = 50;
/// Maximum length of a client name
pub const MAX_CLIENT_NAME: usize = 120;

/// Validate a product's name and brand after cleaning
pub fn validate_product_label(name: &str, brand: &str) -> Result<(), &'static str> {
    if name.is_empty() || brand.is_empty() {
        return Err("Product name and brand are required");
    }
    if name.chars().count() > MAX_PRODUCT_NAME {
        return Err("Product name is too long");
    }
    if brand.chars().count() > MAX_PRODUCT_BRAND {
        return Err("Product brand is too long");
    }
    Ok(())
}

/// Validate a quantity for a new intake, dispatch or order line
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be a positive integer");
    }
    Ok(())
}

/// Validate a quantity on an edited batch line (zero allowed)
pub fn validate_edit_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate an explicit stock value set by an administrator
pub fn validate_stock(stock: i32) -> Result<(), &'static str> {
    if stock < 0 {
        return Err("Stock must be zero or more");
    }
    Ok(())
}

/// Validate a purchase order number
pub fn validate_order_number(number: &str) -> Result<(), &'static str> {
    if number.is_empty() {
        return Err("Order number is required");
    }
    if number.chars().count() > MAX_ORDER_NUMBER {
        return Err("Order number is too long");
    }
    Ok(())
}

/// Validate a client name
pub fn validate_client_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Client name is required");
    }
    if name.chars().count() > MAX_CLIENT_NAME {
        return Err("Client name is too long");
    }
    Ok(())
}

/// Extension of an uploaded file when it is in the allowed list
pub fn allowed_extension(filename: &str, allowed: &[String]) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_lowercase();
    allowed
        .iter()
        .any(|a| a.eq_ignore_ascii_case(&ext))
        .then_some(ext)
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate a login name (3-80 chars: letters, digits, `.`, `_`, `-`)
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let len = username.chars().count();
    if len < 3 {
        return Err("Username must be at least 3 characters");
    }
    if len > 80 {
        return Err("Username must be at most 80 characters");
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err("Username may only contain letters, digits, '.', '_' and '-'");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Inventory Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_product_label() {
        assert!(validate_product_label("Cemento", "Polpaico").is_ok());
        assert!(validate_product_label("", "Polpaico").is_err());
        assert!(validate_product_label("Cemento", "").is_err());
        assert!(validate_product_label(&"x".repeat(121), "b").is_err());
        assert!(validate_product_label("a", &"x".repeat(81)).is_err());
    }

    #[test]
    fn test_quantities() {
        assert!(validate_positive_quantity(1).is_ok());
        assert!(validate_positive_quantity(0).is_err());
        assert!(validate_edit_quantity(0).is_ok());
        assert!(validate_edit_quantity(-1).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-3).is_err());
    }

    #[test]
    fn test_validate_order_number() {
        assert!(validate_order_number("OC-2024-001").is_ok());
        assert!(validate_order_number("").is_err());
        assert!(validate_order_number(&"9".repeat(51)).is_err());
    }

    #[test]
    fn test_allowed_extension() {
        let allowed = vec!["jpg".to_string(), "png".to_string()];
        assert_eq!(allowed_extension("foto.JPG", &allowed), Some("jpg".to_string()));
        assert_eq!(allowed_extension("a.b.png", &allowed), Some("png".to_string()));
        assert_eq!(allowed_extension("doc.pdf", &allowed), None);
        assert_eq!(allowed_extension("noext", &allowed), None);
        assert_eq!(allowed_extension(".png", &allowed), None);
    }

    // ========================================================================
    // General Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_username() {
        assert!(validate_username("jperez").is_ok());
        assert!(validate_username("j.perez-2").is_ok());
        assert!(validate_username("jp").is_err());
        assert!(validate_username("j perez").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("changeme123").is_ok());
        assert!(validate_password("short").is_err());
    }
}
