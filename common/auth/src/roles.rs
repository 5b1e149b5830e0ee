/// Client-scoped role that grants administrative access.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
