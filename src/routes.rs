//! Client-side routes

use std::fmt;

/// A page of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Marketplace,
    /// Listing details; the id is checked when the listing is loaded
    ListingDetails(String),
    ForFarmers,
    ForBuyers,
    SignIn,
    SignUp,
    Profile,
    About,
    Contact,
    Pricing,
    NotFound(String),
}

impl Route {
    /// Match a location path; query strings, fragments and a trailing slash
    /// are ignored.
    pub fn parse(path: &str) -> Self {
        let path = path
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

        match segments.as_slice() {
            [] | [""] => Route::Home,
            ["marketplace"] => Route::Marketplace,
            ["marketplace", id] if !id.is_empty() => Route::ListingDetails(id.to_string()),
            ["for-farmers"] => Route::ForFarmers,
            ["for-buyers"] => Route::ForBuyers,
            ["signin"] => Route::SignIn,
            ["signup"] => Route::SignUp,
            ["profile"] => Route::Profile,
            ["about"] => Route::About,
            ["contact"] => Route::Contact,
            ["pricing"] => Route::Pricing,
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Marketplace => "/marketplace".to_string(),
            Route::ListingDetails(id) => format!("/marketplace/{}", id),
            Route::ForFarmers => "/for-farmers".to_string(),
            Route::ForBuyers => "/for-buyers".to_string(),
            Route::SignIn => "/signin".to_string(),
            Route::SignUp => "/signup".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::About => "/about".to_string(),
            Route::Contact => "/contact".to_string(),
            Route::Pricing => "/pricing".to_string(),
            Route::NotFound(path) => path.clone(),
        }
    }

    /// Pages that redirect to sign-in without a session
    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Profile)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_paths_round_trip() {
        let routes = [
            Route::Home,
            Route::Marketplace,
            Route::ListingDetails("0b8f7f7e-4b7d-4a0c-9a53-6f0d8c1a2b3c".into()),
            Route::ForFarmers,
            Route::ForBuyers,
            Route::SignIn,
            Route::SignUp,
            Route::Profile,
            Route::About,
            Route::Contact,
            Route::Pricing,
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn trailing_slash_and_query_are_ignored() {
        assert_eq!(Route::parse("/marketplace/"), Route::Marketplace);
        assert_eq!(Route::parse("/signin?from=/pricing"), Route::SignIn);
        assert_eq!(Route::parse(""), Route::Home);
    }

    #[test]
    fn unknown_paths_are_not_found() {
        assert_eq!(Route::parse("/login"), Route::NotFound("/login".into()));
        assert!(matches!(Route::parse("/marketplace/a/b"), Route::NotFound(_)));
        assert!(Route::Profile.requires_session());
        assert!(!Route::Marketplace.requires_session());
    }
}
