//! Predefined message type tags
//!
//! Tags are process-wide conventions shared by every component on a host.
//! The table is open: components may define their own tags starting at
//! [`MSG_USER_DEFINED_START`].

use crate::message::MessageType;

pub const MSG_INVALID: MessageType = 0x0000;

// Component registration
pub const MSG_REGISTER_COMPONENT: MessageType = 0x0001;
pub const MSG_COMPONENT_CREATED: MessageType = 0x0002;
pub const MSG_DEREGISTER_COMPONENT: MessageType = 0x0003;
pub const MSG_COMPONENT_DELETED: MessageType = 0x0004;
pub const MSG_QUERY_COMPONENT: MessageType = 0x0005;

// Input contexts
pub const MSG_CREATE_INPUT_CONTEXT: MessageType = 0x0020;
pub const MSG_INPUT_CONTEXT_CREATED: MessageType = 0x0021;
pub const MSG_DELETE_INPUT_CONTEXT: MessageType = 0x0022;
pub const MSG_INPUT_CONTEXT_DELETED: MessageType = 0x0023;
pub const MSG_FOCUS_INPUT_CONTEXT: MessageType = 0x0028;
pub const MSG_INPUT_CONTEXT_GOT_FOCUS: MessageType = 0x0029;
pub const MSG_BLUR_INPUT_CONTEXT: MessageType = 0x002A;
pub const MSG_INPUT_CONTEXT_LOST_FOCUS: MessageType = 0x002B;

// Keyboard
pub const MSG_SEND_KEY_EVENT: MessageType = 0x0060;
pub const MSG_PROCESS_KEY_EVENT: MessageType = 0x0061;
pub const MSG_SYNTHESIZE_KEY_EVENT: MessageType = 0x0062;

// Composition
pub const MSG_SET_COMPOSITION: MessageType = 0x0080;
pub const MSG_CANCEL_COMPOSITION: MessageType = 0x0081;
pub const MSG_COMPLETE_COMPOSITION: MessageType = 0x0082;
pub const MSG_COMPOSITION_CHANGED: MessageType = 0x0083;
pub const MSG_QUERY_COMPOSITION: MessageType = 0x0084;

/// Commits text into the application; closes the current composition window
pub const MSG_INSERT_TEXT: MessageType = 0x00A0;

// Candidate list
pub const MSG_SET_CANDIDATE_LIST: MessageType = 0x00C0;
pub const MSG_CANDIDATE_LIST_CHANGED: MessageType = 0x00C1;
pub const MSG_SELECT_CANDIDATE: MessageType = 0x00CC;

// Settings
pub const MSG_SETTINGS_SET_VALUES: MessageType = 0x0180;
pub const MSG_SETTINGS_GET_VALUES: MessageType = 0x0181;
pub const MSG_SETTINGS_CHANGED: MessageType = 0x0186;

// Plugin manager
pub const MSG_PLUGIN_QUERY_COMPONENTS: MessageType = 0x0260;
pub const MSG_PLUGIN_START_COMPONENTS: MessageType = 0x0261;
pub const MSG_PLUGIN_STOP_COMPONENTS: MessageType = 0x0262;
pub const MSG_PLUGIN_UNLOAD: MessageType = 0x0263;
pub const MSG_PLUGIN_INSTALLED: MessageType = 0x0264;
/// Broadcast by the plugin manager when the available component set changed
pub const MSG_PLUGIN_CHANGED: MessageType = 0x0265;

pub const MSG_SYSTEM_RESERVED_START: MessageType = 0x8000;
pub const MSG_SYSTEM_RESERVED_END: MessageType = 0xFFFF;

/// First tag available to components for private protocols
pub const MSG_USER_DEFINED_START: MessageType = 0x10000;

/// True for tags in the user-defined range
pub fn is_user_defined(msg_type: MessageType) -> bool {
    msg_type >= MSG_USER_DEFINED_START
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defined_range() {
        assert!(is_user_defined(MSG_USER_DEFINED_START));
        assert!(is_user_defined(MSG_USER_DEFINED_START + 10));
        assert!(!is_user_defined(MSG_PLUGIN_CHANGED));
        assert!(!is_user_defined(MSG_SYSTEM_RESERVED_END));
    }
}
