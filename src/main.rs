use federation_api::config::Settings;

#[rocket::main]
async fn main() {
    federation_api::init_logger();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("refusing to start: {}", err);
            std::process::exit(1);
        }
    };

    let rocket = match federation_api::rocket(settings) {
        Ok(rocket) => rocket,
        Err(err) => {
            log::error!("refusing to start: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = rocket.launch().await {
        log::error!("server stopped with error: {}", err);
        std::process::exit(1);
    }
}
