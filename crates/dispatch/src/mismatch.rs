//! Diagnostics for commands that received the wrong kind of context.

use crate::{
    context::{ContextKind, ContextTypeMismatch},
    engine::{CommandInfo, ModuleCheck},
};

/// Build the operator-facing message for a context type mismatch.
///
/// When the command wanted a guild context and its module has no
/// `RequireGuild` check, the message suggests adding one. When it wanted a
/// custom context, the message points at `ContextFactory::create_context`.
pub fn describe(command: Option<&CommandInfo>, mismatch: &ContextTypeMismatch) -> String {
    let name = command.map_or("<unknown>", |c| c.name.as_str());
    let mut message = format!(
        "A command context type mismatch occurred while attempting to execute {name}. \
         The module expected {}, but got {}.",
        mismatch.expected, mismatch.actual
    );

    let guarded = command.is_some_and(|c| c.has_check(&ModuleCheck::RequireGuild));
    if mismatch.expected == ContextKind::Guild && !guarded {
        message.push_str(" Did you forget to add the RequireGuild check to the module?");
    }

    if !mismatch.expected.is_builtin() {
        message.push_str(
            " If you have not overridden ContextFactory::create_context, you must do so and have \
             it return the given context kind. Otherwise ensure it returns the correct context kinds.",
        );
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch(expected: ContextKind, actual: ContextKind) -> ContextTypeMismatch {
        ContextTypeMismatch { expected, actual }
    }

    #[test]
    fn guild_without_check_hints_require_guild() {
        let info = CommandInfo::new("ban", "Moderation");
        let text = describe(
            Some(&info),
            &mismatch(ContextKind::Guild, ContextKind::Standard),
        );
        assert!(text.starts_with(
            "A command context type mismatch occurred while attempting to execute ban. \
             The module expected GuildContext, but got StandardContext."
        ));
        assert!(text.contains("RequireGuild"));
        assert!(!text.contains("create_context"));
    }

    #[test]
    fn guild_with_check_has_no_hint() {
        let info = CommandInfo::new("ban", "Moderation").with_check(ModuleCheck::RequireGuild);
        let text = describe(
            Some(&info),
            &mismatch(ContextKind::Guild, ContextKind::Standard),
        );
        assert!(!text.contains("Did you forget"));
    }

    #[test]
    fn custom_kind_hints_factory_override() {
        let info = CommandInfo::new("tag", "Tags");
        let text = describe(
            Some(&info),
            &mismatch(ContextKind::Custom("TagContext".into()), ContextKind::Guild),
        );
        assert!(text.contains("expected TagContext, but got GuildContext"));
        assert!(text.contains("ContextFactory::create_context"));
        assert!(!text.contains("RequireGuild"));
    }

    #[test]
    fn unknown_command_still_described() {
        let text = describe(None, &mismatch(ContextKind::Standard, ContextKind::Custom("X".into())));
        assert!(text.contains("execute <unknown>"));
    }
}
