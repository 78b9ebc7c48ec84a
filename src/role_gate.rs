//! Role-based route and navigation gating

use crate::types::{CredentialRecord, Role};

pub const LOGIN_ROUTE: &str = "/";
pub const REGISTER_ROUTE: &str = "/register";
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// No session: send the user to the login screen
    RedirectToLogin,
    /// Session present, role not allowed
    RedirectToUnauthorized,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Route to navigate to instead of the requested one
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::RedirectToLogin => Some(LOGIN_ROUTE),
            AccessDecision::RedirectToUnauthorized => Some(UNAUTHORIZED_ROUTE),
        }
    }
}

/// Decide whether `credential` satisfies `required_roles`
///
/// `None` means any authenticated role. A session needs both an access token
/// and a recognised role to count as authenticated.
pub fn can_access(required_roles: Option<&[Role]>, credential: &CredentialRecord) -> AccessDecision {
    let role = match (credential.has_access_token(), credential.role()) {
        (true, Some(role)) => role,
        _ => return AccessDecision::RedirectToLogin,
    };

    match required_roles {
        None => AccessDecision::Allow,
        Some(roles) if roles.contains(&role) => AccessDecision::Allow,
        Some(_) => AccessDecision::RedirectToUnauthorized,
    }
}

/// Who may open a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    Roles(&'static [Role]),
}

#[derive(Debug, Clone, Copy)]
pub struct RouteRule {
    pub path: &'static str,
    pub access: RouteAccess,
}

pub const ROUTES: &[RouteRule] = &[
    RouteRule { path: LOGIN_ROUTE, access: RouteAccess::Public },
    RouteRule { path: REGISTER_ROUTE, access: RouteAccess::Public },
    RouteRule { path: UNAUTHORIZED_ROUTE, access: RouteAccess::Public },
    RouteRule { path: "/Admin-Dashboard", access: RouteAccess::Roles(&[Role::Admin]) },
    RouteRule { path: "/User-Management", access: RouteAccess::Roles(&[Role::Admin]) },
    RouteRule { path: "/tasks-management", access: RouteAccess::Roles(&[Role::Manager]) },
    RouteRule { path: "/Manager-Dashboard", access: RouteAccess::Roles(&[Role::Manager]) },
    RouteRule { path: "/Member-Dashboard", access: RouteAccess::Roles(&[Role::Member]) },
    RouteRule { path: "/my-tasks", access: RouteAccess::Roles(&[Role::Member]) },
];

fn normalize(path: &str) -> &str {
    let path = path.split(|c| c == '?' || c == '#').next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => LOGIN_ROUTE,
        trimmed => trimmed,
    }
}

/// Rule for `path`; unknown routes require an authenticated session
///
/// Paths match case-insensitively, as the router resolves them.
pub fn route_access(path: &str) -> RouteAccess {
    let path = normalize(path);
    ROUTES
        .iter()
        .find(|rule| rule.path.eq_ignore_ascii_case(path))
        .map(|rule| rule.access)
        .unwrap_or(RouteAccess::Authenticated)
}

/// Decision for navigating to `path`
pub fn guard_route(path: &str, credential: &CredentialRecord) -> AccessDecision {
    match route_access(path) {
        RouteAccess::Public => AccessDecision::Allow,
        RouteAccess::Authenticated => can_access(None, credential),
        RouteAccess::Roles(roles) => can_access(Some(roles), credential),
    }
}

/// Sidebar entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLink {
    pub to: &'static str,
    pub label: &'static str,
    /// `None`: visible to any authenticated role
    pub allowed_roles: Option<&'static [Role]>,
}

pub const NAV_LINKS: &[NavLink] = &[
    NavLink { to: "/Admin-Dashboard", label: "Dashboard", allowed_roles: Some(&[Role::Admin]) },
    NavLink { to: "/User-Management", label: "Users", allowed_roles: Some(&[Role::Admin]) },
    NavLink { to: "/Manager-Dashboard", label: "Dashboard", allowed_roles: Some(&[Role::Manager]) },
    NavLink { to: "/Member-Dashboard", label: "Dashboard", allowed_roles: Some(&[Role::Member]) },
    NavLink { to: "/tasks-management", label: "Tasks", allowed_roles: Some(&[Role::Admin, Role::Manager]) },
    NavLink { to: "/my-tasks", label: "My Tasks", allowed_roles: Some(&[Role::Member]) },
    NavLink { to: "/reports", label: "Reports", allowed_roles: Some(&[Role::Admin, Role::Manager]) },
];

/// Links whose requirement the current session satisfies
pub fn visible_links(credential: &CredentialRecord) -> Vec<&'static NavLink> {
    NAV_LINKS
        .iter()
        .filter(|link| can_access(link.allowed_roles, credential).is_allowed())
        .collect()
}

/// True when `current` is `link` or one of its sub-routes
pub fn is_active_link(link: &NavLink, current: &str) -> bool {
    let current = normalize(current);
    let prefix = link.to.len();
    match current.get(..prefix) {
        Some(head) if head.eq_ignore_ascii_case(link.to) => {
            current.len() == prefix || current[prefix..].starts_with('/')
        }
        _ => false,
    }
}
