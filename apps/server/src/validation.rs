use validator::ValidationError;

const MAX_USERNAME_LEN: usize = 32;
const MAX_MESSAGE_LEN: usize = 4000;

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_USERNAME_LEN {
        return Err(ValidationError::new("username_length"));
    }
    Ok(())
}

pub fn validate_message_content(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_MESSAGE_LEN {
        return Err(ValidationError::new("message_content_length"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation_requires_nonempty_trimmed() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("  alice  ").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn message_content_validation_rejects_blank() {
        assert!(validate_message_content("hello").is_ok());
        assert!(validate_message_content("   ").is_err());
        assert!(validate_message_content(&"x".repeat(4001)).is_err());
    }
}
