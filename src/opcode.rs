//! The instruction set (spec §4.3 "Dispatch Loop" opcode family table).
//!
//! One flat, explicitly-numbered enum so a [`crate::engine::JumpTable`] can
//! index straight into a `[Option<InstructionHandler>; 256]` array.

/// A single bytecode operation. Grouped by family below, matching the
/// table in the dispatch-loop design: arithmetic, comparison, assignment,
/// inc/dec, control, fetch, array, class declaration, new/clone,
/// exceptions, calls, iteration, generators, output/misc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // --- Arithmetic ---
    Add = 0x01,
    Sub = 0x02,
    Mul = 0x03,
    Div = 0x04,
    Mod = 0x05,
    Pow = 0x06,
    BwAnd = 0x07,
    BwOr = 0x08,
    BwXor = 0x09,
    BwNot = 0x0A,
    Sl = 0x0B,
    Sr = 0x0C,
    Concat = 0x0D,

    // --- Comparison ---
    IsEqual = 0x10,
    IsNotEqual = 0x11,
    IsIdentical = 0x12,
    IsNotIdentical = 0x13,
    IsSmaller = 0x14,
    IsSmallerOrEqual = 0x15,
    Spaceship = 0x16,
    BoolNot = 0x17,
    BoolAnd = 0x18,
    BoolOr = 0x19,

    // --- Assignment ---
    Assign = 0x20,
    QmAssign = 0x21,
    AssignRef = 0x22,
    AssignOp = 0x23,
    AssignDim = 0x24,
    AssignObj = 0x25,
    AssignObjOp = 0x26,
    AssignDimRef = 0x27,
    AssignObjRef = 0x28,

    // --- Inc/Dec ---
    PreInc = 0x30,
    PostInc = 0x31,
    PreDec = 0x32,
    PostDec = 0x33,

    // --- Control ---
    Jmp = 0x40,
    Jmpz = 0x41,
    Jmpnz = 0x42,

    // --- Fetch (spec §4.4) ---
    FetchR = 0x50,
    FetchRDynamic = 0x51,
    FetchDimR = 0x52,
    FetchDimIs = 0x53,
    FetchDimW = 0x54,
    FetchDimRw = 0x55,
    FetchDimUnset = 0x56,
    FetchObjR = 0x57,
    FetchObjIs = 0x58,
    FetchObjRw = 0x59,
    FetchStaticPropR = 0x5A,
    FetchStaticPropW = 0x5B,
    FetchConstant = 0x5C,
    FetchClassConstant = 0x5D,
    FetchLateStaticConstant = 0x5E,

    // --- Array ---
    InitArray = 0x60,
    AddArrayElement = 0x61,
    AddArrayUnpack = 0x62,

    // --- Class declaration ---
    InitClassTable = 0x70,
    SetCurrentClass = 0x71,
    SetClassParent = 0x72,
    DeclareProperty = 0x73,
    DeclareConstant = 0x74,
    DeclareClass = 0x75,
    DeclareInterface = 0x76,
    AddInterface = 0x77,
    DeclareTrait = 0x78,
    UseTrait = 0x79,
    ClearCurrentClass = 0x7A,

    // --- New/Clone ---
    New = 0x80,
    Clone = 0x81,
    Instanceof = 0x82,

    // --- Exceptions (spec §4.6) ---
    Throw = 0x90,
    Catch = 0x91,
    Finally = 0x92,
    AssignException = 0x93,
    ExceptionMatch = 0x94,
    ClearException = 0x95,
    Rethrow = 0x96,

    // --- Calls (spec §4.5) ---
    InitFcall = 0xA0,
    InitMethodCall = 0xA1,
    InitStaticMethodCall = 0xA2,
    SendVal = 0xA3,
    SendVar = 0xA4,
    SendRef = 0xA5,
    SendValNamed = 0xA6,
    DoFcall = 0xA7,
    Return = 0xA8,
    ReturnByRef = 0xA9,
    CreateClosure = 0xAA,
    BindUseVar = 0xAB,
    CreateFuncCallable = 0xAC,
    CreateMethodCallable = 0xAD,
    CreateStaticCallable = 0xAE,

    // --- Iteration (spec §4.7) ---
    FeReset = 0xB0,
    FeFetch = 0xB1,
    FeFree = 0xB2,

    // --- Generators (spec §4.8) ---
    Yield = 0xC0,
    YieldFrom = 0xC1,

    // --- Output / Misc ---
    Echo = 0xD0,
    Print = 0xD1,
    Exit = 0xD2,
    Nop = 0xD3,
    IssetIsemptyVar = 0xD4,
    UnsetVar = 0xD5,
    CastBool = 0xD6,
    CastLong = 0xD7,
    CastDouble = 0xD8,
    CastString = 0xD9,
    CastArray = 0xDA,
    CastObject = 0xDB,
    Include = 0xDC,
    Require = 0xDD,
    IncludeOnce = 0xDE,
    RequireOnce = 0xDF,
    BeginSilence = 0xE0,
    EndSilence = 0xE1,
    BindStatic = 0xE2,
    FetchListR = 0xE3,
}

impl OpCode {
    /// All variants, in declaration order. Used by tests asserting every
    /// opcode has a registered handler.
    pub const ALL: &'static [OpCode] = &[
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Mod,
        OpCode::Pow,
        OpCode::BwAnd,
        OpCode::BwOr,
        OpCode::BwXor,
        OpCode::BwNot,
        OpCode::Sl,
        OpCode::Sr,
        OpCode::Concat,
        OpCode::IsEqual,
        OpCode::IsNotEqual,
        OpCode::IsIdentical,
        OpCode::IsNotIdentical,
        OpCode::IsSmaller,
        OpCode::IsSmallerOrEqual,
        OpCode::Spaceship,
        OpCode::BoolNot,
        OpCode::BoolAnd,
        OpCode::BoolOr,
        OpCode::Assign,
        OpCode::QmAssign,
        OpCode::AssignRef,
        OpCode::AssignOp,
        OpCode::AssignDim,
        OpCode::AssignObj,
        OpCode::AssignObjOp,
        OpCode::AssignDimRef,
        OpCode::AssignObjRef,
        OpCode::PreInc,
        OpCode::PostInc,
        OpCode::PreDec,
        OpCode::PostDec,
        OpCode::Jmp,
        OpCode::Jmpz,
        OpCode::Jmpnz,
        OpCode::FetchR,
        OpCode::FetchRDynamic,
        OpCode::FetchDimR,
        OpCode::FetchDimIs,
        OpCode::FetchDimW,
        OpCode::FetchDimRw,
        OpCode::FetchDimUnset,
        OpCode::FetchObjR,
        OpCode::FetchObjIs,
        OpCode::FetchObjRw,
        OpCode::FetchStaticPropR,
        OpCode::FetchStaticPropW,
        OpCode::FetchConstant,
        OpCode::FetchClassConstant,
        OpCode::FetchLateStaticConstant,
        OpCode::InitArray,
        OpCode::AddArrayElement,
        OpCode::AddArrayUnpack,
        OpCode::InitClassTable,
        OpCode::SetCurrentClass,
        OpCode::SetClassParent,
        OpCode::DeclareProperty,
        OpCode::DeclareConstant,
        OpCode::DeclareClass,
        OpCode::DeclareInterface,
        OpCode::AddInterface,
        OpCode::DeclareTrait,
        OpCode::UseTrait,
        OpCode::ClearCurrentClass,
        OpCode::New,
        OpCode::Clone,
        OpCode::Instanceof,
        OpCode::Throw,
        OpCode::Catch,
        OpCode::Finally,
        OpCode::AssignException,
        OpCode::ExceptionMatch,
        OpCode::ClearException,
        OpCode::Rethrow,
        OpCode::InitFcall,
        OpCode::InitMethodCall,
        OpCode::InitStaticMethodCall,
        OpCode::SendVal,
        OpCode::SendVar,
        OpCode::SendRef,
        OpCode::SendValNamed,
        OpCode::DoFcall,
        OpCode::Return,
        OpCode::ReturnByRef,
        OpCode::CreateClosure,
        OpCode::BindUseVar,
        OpCode::CreateFuncCallable,
        OpCode::CreateMethodCallable,
        OpCode::CreateStaticCallable,
        OpCode::FeReset,
        OpCode::FeFetch,
        OpCode::FeFree,
        OpCode::Yield,
        OpCode::YieldFrom,
        OpCode::Echo,
        OpCode::Print,
        OpCode::Exit,
        OpCode::Nop,
        OpCode::IssetIsemptyVar,
        OpCode::UnsetVar,
        OpCode::CastBool,
        OpCode::CastLong,
        OpCode::CastDouble,
        OpCode::CastString,
        OpCode::CastArray,
        OpCode::CastObject,
        OpCode::Include,
        OpCode::Require,
        OpCode::IncludeOnce,
        OpCode::RequireOnce,
        OpCode::BeginSilence,
        OpCode::EndSilence,
        OpCode::BindStatic,
        OpCode::FetchListR,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_values_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in OpCode::ALL {
            assert!(seen.insert(*op as u8), "duplicate opcode byte for {op:?}");
        }
    }
}
