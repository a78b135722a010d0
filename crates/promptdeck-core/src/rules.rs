/// Scenario taxonomy rules — single source of truth for AI classification prompts and MCP instructions.
pub const RULES: &str = "\
1. The taxonomy has exactly three levels. Level 1 is the subject area (\"Science\", \
\"Language Arts\"), level 2 is the topic within it (\"Physics\", \"Essay Writing\"), level 3 \
is the specific teaching scene (\"Lab report feedback\", \"Thesis statement practice\"). \
There is no level 4 — do NOT invent deeper nesting.\n\
2. Every category except level 1 has exactly one parent, one level shallower. A level-2 \
category's parent is a level-1 category; a level-3 category's parent is a level-2 category. \
Never parent a level-3 category directly under a level-1 category.\n\
3. Level-1 categories have no parent. A level-1 category with a parent link is malformed data.\n\
4. Prompts attach to at most one category, at any level. Filing a prompt at level 1 or 2 is \
legitimate when no leaf fits — it means \"general to this subject/topic\", not \"unclassified\".\n\
5. A prompt with no category is uncategorized. Uncategorized prompts only surface in \
unfiltered views; prefer suggesting a category over leaving a prompt uncategorized.\n\
6. Classify by what the prompt asks the AI to do, not by vocabulary overlap. A prompt that \
mentions photosynthesis but asks for a quiz rubric belongs under assessment scenes, not \
under biology content scenes.\n\
7. Prefer the deepest category that genuinely fits. If only the subject is clear, classify \
at level 1 rather than guessing a topic.\n\
8. Category names are short noun phrases describing the teaching scene, not the audience or \
the AI model (\"Report card comments\", not \"Prompts for teachers using GPT\").\n\
9. Aggregate counts roll upward. A category's prompt count includes every prompt filed under \
it or any descendant, so moving a prompt to a leaf never removes it from its subject's count.\n\
10. Preset categories (isCustom=false) are shared fixtures — do not rename or delete them. \
User-created categories (isCustom=true) may be freely edited by their owner.\n\
\n\
## Workflow\n\
1. `list_libraries` to see existing prompt libraries.\n\
2. `get_scenario_tree` to see the taxonomy with aggregate prompt counts before filing or \
filtering anything — category ids, not names, are what every other tool takes.\n\
3. Use `list_prompts` with level1/level2/level3 ids to narrow; omit a level to mean \
\"all at this level\". Filtering by a level-1 id returns the whole subtree's prompts.\n\
4. When a prompt arrives unclassified, call `suggest_category` and file it with \
`update_prompts` once the user confirms.\n\
5. `resolve_selection` turns a deep-linked scenario id (URL query parameter) into the \
level-1/2/3 selection state; broken ancestor chains come back as errors, not guesses.";
