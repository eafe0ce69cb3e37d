use std::{env, env::VarError};

use dotenv::dotenv;
use rand::{distr::Alphanumeric, Rng};

/// `OrderLine` -> `order_line`, `HTTPRequest` -> `http_request`. Characters that are not
/// alphanumeric or `_` are dropped.
pub fn camel_to_snake(s: &str) -> String {
    let chars: Vec<char> = s.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
    let mut snake_case = String::with_capacity(chars.len() + 4);

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let previous_is_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let acronym_ends = i > 0 &&
                chars[i - 1].is_uppercase() &&
                chars.get(i + 1).is_some_and(|next| next.is_lowercase());
            if (previous_is_lower || acronym_ends) && !snake_case.ends_with('_') {
                snake_case.push('_');
            }
            snake_case.extend(c.to_lowercase());
        } else {
            snake_case.push(*c);
        }
    }

    snake_case
}

pub fn generate_random_id(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

pub fn public_read_env_value(var_name: &str) -> Result<String, VarError> {
    dotenv().ok();
    env::var(var_name)
}
