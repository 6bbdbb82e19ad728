use actix_web::web;

mod health;
mod hosts;
mod services;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_route)
            .service(hosts::status_route)
            .service(hosts::host_status_route)
            .service(hosts::service_status_route)
            .service(hosts::last_check_route)
            .service(hosts::hosts_route)
            .service(hosts::check_now_route)
            .service(hosts::silence_route)
            .service(hosts::commands_route)
            .service(services::services_route)
            .service(services::tag_route)
            .service(services::history_route),
    );
}
