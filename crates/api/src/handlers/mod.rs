pub mod events;
pub mod webhooks;
pub mod automations;
pub mod pipes;
pub mod cards;
