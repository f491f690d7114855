use rocket::Route;

use crate::config::Role;

pub mod auth;
pub mod backend;
pub mod intermediary;

/// The routes served by `role`.
pub fn routes(role: Role) -> Vec<Route> {
    match role {
        Role::Auth => auth::routes(),
        Role::Intermediary => intermediary::routes(),
        Role::Backend => backend::routes(),
    }
}
