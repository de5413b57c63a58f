pub mod user;
pub mod investment_plan;

pub use user::Entity as User;
pub use investment_plan::Entity as InvestmentPlan;
