pub mod booking;
pub mod conversation;
pub mod inbound;
pub mod tenant;
pub mod whatsapp;

pub use booking::{Booking, BookingError, BookingStatus, NewBooking, TimeSlot, WorkingHours};
pub use conversation::{ConversationTurn, Role};
pub use inbound::{InboundMessage, Provider};
pub use tenant::{
    BotConfig, BotPersonality, BusinessProfile, Contact, ProviderCredentials, Service,
    TenantWhatsAppConfig,
};
