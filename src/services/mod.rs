pub mod coingecko_client;
pub mod plan_service;
pub mod price_analysis_service;

pub use coingecko_client::{ CoinGeckoClient, PriceHistorySource, PricePoint };
pub use plan_service::PlanService;
pub use price_analysis_service::{ FactorModel, PriceAnalysisService, TrendAnalysis };
