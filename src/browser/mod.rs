mod cdp;
mod context;
mod discovery;
mod launcher;
mod selector;

pub use cdp::{CdpContext, CdpPage};
pub use context::{
    click_when_visible, first_visible, wait_for_visible, BrowserContext, PageHandle, SessionTimeouts,
    SharedPage, TargetEntry, TargetKind,
};
pub use discovery::{discover_all_browsers, resolve_browser, BrowserInfo, BrowserType};
pub use launcher::{
    provider_from_config, resolve_ws_url, ContextProvider, LaunchSpec, LocalLauncher,
    RemoteAttach,
};
pub use selector::Selector;
