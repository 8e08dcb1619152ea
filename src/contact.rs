//! Phone number normalization and contact deep links

use crate::listings::Listing;

/// Kenyan country calling code
const COUNTRY_CODE: &str = "254";

/// Normalize a user-entered phone number to international form.
///
/// Non-digits are dropped first. A leading `0` becomes `+254`, a leading
/// `254` just gains a `+`, and a bare nine-digit subscriber number gets
/// `+254` in front. Anything else is passed through with a `+`.
pub fn format_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        String::new()
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+{}{}", COUNTRY_CODE, rest)
    } else if digits.starts_with(COUNTRY_CODE) {
        format!("+{}", digits)
    } else if digits.len() == 9 {
        format!("+{}{}", COUNTRY_CODE, digits)
    } else {
        format!("+{}", digits)
    }
}

/// `tel:` link for a phone number, `None` when it has no digits
pub fn call_link(raw: &str) -> Option<String> {
    let number = format_phone_number(raw);
    (!number.is_empty()).then(|| format!("tel:{}", number))
}

/// WhatsApp chat link with a pre-filled message about `listing_title`
pub fn whatsapp_link(raw: &str, listing_title: &str) -> Option<String> {
    let number = format_phone_number(raw);
    if number.is_empty() {
        return None;
    }

    let message = format!(
        "Hi, I'm interested in your {} listed on MkulimaExpo.",
        listing_title
    );
    Some(format!(
        "https://wa.me/{}?text={}",
        number.trim_start_matches('+'),
        urlencoding::encode(&message)
    ))
}

/// What a listing view offers for reaching the seller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactAffordance {
    /// Anonymous viewers are asked to sign up first
    SignUpPrompt,
    /// Links for a signed-in viewer; absent when the seller left no number
    Reach {
        call: Option<String>,
        whatsapp: Option<String>,
    },
}

impl ContactAffordance {
    pub fn for_listing(signed_in: bool, listing: &Listing) -> Self {
        if !signed_in {
            return ContactAffordance::SignUpPrompt;
        }

        let phone = listing
            .seller
            .as_ref()
            .and_then(|seller| seller.phone_number.as_deref())
            .unwrap_or_default();
        ContactAffordance::Reach {
            call: call_link(phone),
            whatsapp: whatsapp_link(phone, &listing.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_numbers_get_country_code() {
        assert_eq!(format_phone_number("0712345678"), "+254712345678");
        assert_eq!(format_phone_number("0712 345 678"), "+254712345678");
        assert_eq!(format_phone_number("712345678"), "+254712345678");
    }

    #[test]
    fn international_numbers_are_kept() {
        assert_eq!(format_phone_number("254712345678"), "+254712345678");
        assert_eq!(format_phone_number("+254 712-345-678"), "+254712345678");
        assert_eq!(format_phone_number("+1 (555) 123-4567"), "+15551234567");
    }

    #[test]
    fn no_digits_means_no_number() {
        assert_eq!(format_phone_number(""), "");
        assert_eq!(format_phone_number("call me"), "");
        assert_eq!(call_link("n/a"), None);
        assert_eq!(whatsapp_link("", "Maize"), None);
    }

    #[test]
    fn links_use_normalized_number() {
        assert_eq!(call_link("0712345678").as_deref(), Some("tel:+254712345678"));

        let link = whatsapp_link("0712345678", "Fresh Tomatoes").unwrap();
        assert!(link.starts_with("https://wa.me/254712345678?text="));
        assert!(link.contains("Fresh%20Tomatoes"));
        assert!(!link.contains(' '));
    }
}
