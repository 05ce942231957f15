use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================
//
// Every instruction is one 32-bit little-endian opcode word followed by a
// fixed number of 32-bit operand words. Opcode numbers are the declaration
// order below and are part of the object format: append, never reorder.

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $mnemonic:literal, $operands:literal; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u32)]
        pub enum Op {
            $( $(#[$doc])* $name, )*
        }

        impl Op {
            pub const ALL: &'static [Op] = &[ $( Op::$name, )* ];

            /// Number of operand words following the opcode word.
            pub fn operand_count(self) -> usize {
                match self {
                    $( Op::$name => $operands, )*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Op::$name => $mnemonic, )*
                }
            }
        }
    };
}

opcodes! {
    // Calls
    /// `[command number, argument count]`; arguments are on the stack.
    Command = "COMMAND", 2;

    // Branches (operand is an absolute segment offset)
    IfGoto = "IF_GOTO", 1;
    IfNotGoto = "IF_NOT_GOTO", 1;
    Goto = "GOTO", 1;
    /// `[value, target]`: if the top of stack equals `value`, pops it and jumps;
    /// otherwise leaves the stack alone.
    CaseGoto = "CASE_GOTO", 2;
    Drop = "DROP", 0;

    // Binary and unary operators
    OrLogical = "OR", 0;
    AndLogical = "AND", 0;
    OrBitwise = "BIT_OR", 0;
    EorBitwise = "BIT_XOR", 0;
    AndBitwise = "BIT_AND", 0;
    Equals = "EQ", 0;
    NotEquals = "NE", 0;
    LessThan = "LT", 0;
    AtMost = "LE", 0;
    GreaterThan = "GT", 0;
    AtLeast = "GE", 0;
    NegateLogical = "NOT", 0;
    LeftShift = "SHL", 0;
    RightShift = "SHR", 0;
    Add = "ADD", 0;
    Subtract = "SUB", 0;
    UnaryMinus = "NEG", 0;
    Multiply = "MUL", 0;
    Divide = "DIV", 0;
    Modulus = "MOD", 0;

    // Pushes
    PushNumber = "PUSH_NUM", 1;
    PushStringIndex = "PUSH_STR", 1;
    PushGlobalVar = "PUSH_GLOBAL", 1;
    PushLocalVar = "PUSH_LOCAL", 1;

    // Global variable updates (operand is the global slot)
    AssignGlobalVar = "SET_GLOBAL", 1;
    AddGlobalVar = "ADD_GLOBAL", 1;
    SubtractGlobalVar = "SUB_GLOBAL", 1;
    MultiplyGlobalVar = "MUL_GLOBAL", 1;
    DivideGlobalVar = "DIV_GLOBAL", 1;
    ModGlobalVar = "MOD_GLOBAL", 1;
    LeftShiftGlobalVar = "SHL_GLOBAL", 1;
    RightShiftGlobalVar = "SHR_GLOBAL", 1;
    IncreaseGlobalVar = "INC_GLOBAL", 1;
    DecreaseGlobalVar = "DEC_GLOBAL", 1;

    // State-local variable updates (operand is the local slot)
    AssignLocalVar = "SET_LOCAL", 1;
    AddLocalVar = "ADD_LOCAL", 1;
    SubtractLocalVar = "SUB_LOCAL", 1;
    MultiplyLocalVar = "MUL_LOCAL", 1;
    DivideLocalVar = "DIV_LOCAL", 1;
    ModLocalVar = "MOD_LOCAL", 1;
    LeftShiftLocalVar = "SHL_LOCAL", 1;
    RightShiftLocalVar = "SHR_LOCAL", 1;
    IncreaseLocalVar = "INC_LOCAL", 1;
    DecreaseLocalVar = "DEC_LOCAL", 1;

    // Segment terminators
    EndOnEnter = "END_ONENTER", 0;
    EndMainLoop = "END_MAINLOOP", 0;
    EndOnExit = "END_ONEXIT", 0;
    EndEvent = "END_EVENT", 0;
}

impl Op {
    pub fn word(self) -> u32 {
        self as u32
    }

    pub fn from_word(word: u32) -> Option<Op> {
        Op::ALL.get(word as usize).copied()
    }

    /// True for instructions whose last operand is a jump target.
    pub fn is_branch(self) -> bool {
        matches!(self, Op::IfGoto | Op::IfNotGoto | Op::Goto | Op::CaseGoto)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
