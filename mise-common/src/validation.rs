//! Input validation helpers
//!
//! Plain predicates with no framework dependencies; HTTP handlers turn a
//! `false` into a 400 response.

/// Words the detectors report that are not ingredients
const NON_FOOD_ITEMS: &[&str] = &[
    "plate", "bowl", "table", "hand", "person", "kitchen", "utensil",
];

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 8;

/// `local@domain.tld` with a conventional character set and a 2+ letter TLD
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));

    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    local_ok && host_ok && tld_ok
}

/// 3-50 characters, ASCII letters, digits and underscores only
pub fn validate_username(username: &str) -> bool {
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LEN
}

/// Trim and lowercase an ingredient name
pub fn normalize_ingredient_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether a normalized detector label looks like an actual ingredient
pub fn is_plausible_ingredient(name: &str) -> bool {
    name.chars().count() > 2 && !NON_FOOD_ITEMS.contains(&name)
}

/// Normalize names and drop non-food or too-short entries, keeping order
pub fn clean_ingredient_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| normalize_ingredient_name(n.as_ref()))
        .filter(|n| is_plausible_ingredient(n))
        .collect()
}
