pub mod acled;
pub mod arxiv;
pub mod courtlistener;
pub mod eurostat;
pub mod fbi_crime;
pub mod gdelt;
pub mod gtd;
pub mod hdx;
pub mod hibp;
pub mod icews;
pub mod misp;
pub mod opensanctions;
pub mod otx;
pub mod reddit;
pub mod reliefweb;
pub mod rss;
pub mod sec_edgar;
pub mod shodan;

pub use acled::AcledAdapter;
pub use arxiv::ArxivAdapter;
pub use courtlistener::CourtListenerAdapter;
pub use eurostat::EurostatAdapter;
pub use fbi_crime::FbiCrimeAdapter;
pub use gdelt::GdeltAdapter;
pub use gtd::GtdAdapter;
pub use hdx::HdxAdapter;
pub use hibp::HibpAdapter;
pub use icews::IcewsAdapter;
pub use misp::MispAdapter;
pub use opensanctions::OpenSanctionsAdapter;
pub use otx::OtxAdapter;
pub use reddit::RedditAdapter;
pub use reliefweb::ReliefWebAdapter;
pub use rss::RssAdapter;
pub use sec_edgar::SecEdgarAdapter;
pub use shodan::ShodanAdapter;
