#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment, Build, Rocket};

use crate::{
    config::{AuthFairing, BackendFairing, IntermediaryFairing, Role, ServerConfig, StorageFairing},
    logging::LoggerFairing,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

#[cfg(test)]
mod testing;

/// Build the server for the role named by the `role` config key.
pub fn build() -> Result<Rocket<Build>, figment::Error> {
    let rocket = rocket::build();
    let config = rocket.figment().extract::<ServerConfig>()?;

    let rocket = mount(rocket, config.role).attach(StorageFairing);
    Ok(match config.role {
        Role::Auth => rocket.attach(AuthFairing),
        Role::Intermediary => rocket.attach(IntermediaryFairing),
        Role::Backend => rocket.attach(BackendFairing),
    })
}

/// Mount the routes served by `role`, and request logging.
pub(crate) fn mount(rocket: Rocket<Build>, role: Role) -> Rocket<Build> {
    rocket
        .mount("/", api::routes(role))
        .attach(LoggerFairing { role })
}
