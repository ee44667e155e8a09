mod hooks;

pub(crate) use hooks::{panic_response, route_lifecycle, RouteHooks};
