mod chat_service;


pub use chat_service::{
    ChatService, ChatServiceDependencies, HistoryPage, HistoryRequest, MarkReadOutcome,
    MarkReadRequest, ReadCursor, SendMessageRequest,
};
