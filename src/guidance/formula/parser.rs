use super::ast::{
    BinaryOp, Expr, NAMESPACES, Program, UnaryOp, Variable, lookup_constant, lookup_function,
};
use super::error::FormulaError;
use super::lexer::{Token, TokenKind, tokenize};
use std::collections::BTreeMap;

/// 式の入れ子の上限
const MAX_DEPTH: usize = 64;

/// ソースをコンパイルしてプログラムを生成します
///
/// # 引数
///
/// * `source` - 誘導則のソース
/// * `params` - `params.NAME` で参照できる誘導パラメータ
pub fn compile(source: &str, params: &BTreeMap<String, f64>) -> Result<Program, FormulaError> {
    if source.trim().is_empty() {
        return Err(FormulaError::EmptySource);
    }
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0, locals: Vec::new(), params, depth: 0 }.program()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    locals: Vec<String>,
    params: &'a BTreeMap<String, f64>,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), FormulaError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("{} が必要です", what)))
        }
    }

    fn error(&self, message: String) -> FormulaError {
        FormulaError::Syntax { offset: self.offset(), message }
    }

    fn ident(&mut self) -> Result<(String, usize), FormulaError> {
        let offset = self.offset();
        match self.advance().kind {
            TokenKind::Ident(name) => Ok((name, offset)),
            _ => Err(FormulaError::Syntax { offset, message: "識別子が必要です".to_string() }),
        }
    }

    fn program(mut self) -> Result<Program, FormulaError> {
        let mut bindings = Vec::new();

        while self.eat(&TokenKind::Let) {
            let (name, offset) = self.ident()?;
            if self.is_reserved(&name) {
                return Err(FormulaError::Syntax {
                    offset,
                    message: format!("'{}' は再定義できません", name),
                });
            }
            self.expect(TokenKind::Assign, "'='")?;
            let expr = self.expression()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            // 右辺からは自分自身を参照できない
            self.locals.push(name.clone());
            bindings.push((name, expr));
        }

        self.eat(&TokenKind::Return);
        let result = self.expression()?;
        self.eat(&TokenKind::Semicolon);

        if *self.peek() != TokenKind::Eof {
            return Err(self.error("戻り値の式の後に余分な記述があります".to_string()));
        }

        Ok(Program { bindings, result })
    }

    fn is_reserved(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l == name)
            || Variable::lookup(name).is_some()
            || lookup_constant(name).is_some()
            || lookup_function(name).is_some()
            || NAMESPACES.contains(&name)
    }

    /// 構文木を1段深くする
    ///
    /// 評価は構文木を再帰的にたどるため、木の深さをここで制限します。
    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("式の入れ子が深すぎます".to_string()));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        self.descend()?;
        let expr = self.conditional();
        self.depth -= 1;
        expr
    }

    fn conditional(&mut self) -> Result<Expr, FormulaError> {
        let condition = self.binary(0)?;
        if self.eat(&TokenKind::Question) {
            let then = self.expression()?;
            self.expect(TokenKind::Colon, "':'")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise)));
        }
        Ok(condition)
    }

    /// 優先順位法による二項演算の解析
    fn binary(&mut self, min_prec: u8) -> Result<Expr, FormulaError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        while let Some((op, prec)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            // 左結合の連鎖は1項ごとに木が1段深くなる
            self.descend()?;
            self.advance();
            let rhs = self.binary(prec + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        let Some(op) = op else {
            return self.postfix();
        };
        self.advance();
        self.descend()?;
        let operand = self.unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, FormulaError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        while self.eat(&TokenKind::LBracket) {
            self.descend()?;
            let index = self.expression()?;
            self.expect(TokenKind::RBracket, "']'")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        self.depth = base;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let offset = self.offset();
        match self.advance().kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let elements = self.arguments(TokenKind::RBracket, "']'")?;
                Ok(Expr::Array(elements))
            }
            TokenKind::Ident(name) => self.identifier(name, offset),
            _ => Err(FormulaError::Syntax { offset, message: "式が必要です".to_string() }),
        }
    }

    fn arguments(&mut self, close: TokenKind, what: &str) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(args);
        }
    }

    /// 識別子を組み込み変数・局所変数・定数・関数呼び出し・名前空間参照に解決
    fn identifier(&mut self, name: String, offset: usize) -> Result<Expr, FormulaError> {
        if let Some(index) = self.locals.iter().position(|l| *l == name) {
            return Ok(Expr::Local(index));
        }
        if let Some(variable) = Variable::lookup(&name) {
            return Ok(Expr::Variable(variable));
        }
        if let Some(value) = lookup_constant(&name) {
            return Ok(Expr::Number(value));
        }
        if lookup_function(&name).is_some() {
            return self.call(&name, offset);
        }
        if NAMESPACES.contains(&name.as_str()) {
            self.expect(TokenKind::Dot, "'.'")?;
            let (member, member_offset) = self.ident()?;
            return self.member(&name, &member, member_offset);
        }
        Err(FormulaError::UnknownIdentifier { name, offset })
    }

    fn member(&mut self, namespace: &str, member: &str, offset: usize) -> Result<Expr, FormulaError> {
        match namespace {
            "params" => {
                if member == "N" {
                    return Ok(Expr::Variable(Variable::NavigationRatio));
                }
                self.params
                    .get(member)
                    .map(|value| Expr::Number(*value))
                    .ok_or_else(|| FormulaError::UnknownParameter { name: member.to_string(), offset })
            }
            "Math" => {
                if let Some(value) = lookup_constant(member) {
                    return Ok(Expr::Number(value));
                }
                if lookup_function(member).is_some() {
                    return self.call(member, offset);
                }
                Err(FormulaError::UnknownIdentifier { name: format!("Math.{}", member), offset })
            }
            _ => Variable::lookup_member(namespace, member)
                .map(Expr::Variable)
                .ok_or_else(|| FormulaError::UnknownIdentifier {
                    name: format!("{}.{}", namespace, member),
                    offset,
                }),
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Expr, FormulaError> {
        let signature = lookup_function(name).ok_or_else(|| FormulaError::UnknownIdentifier {
            name: name.to_string(),
            offset,
        })?;
        self.expect(TokenKind::LParen, "関数呼び出しの '('")?;
        let args = self.arguments(TokenKind::RParen, "')'")?;

        let too_few = args.len() < signature.min_args;
        let too_many = signature.max_args.is_some_and(|max| args.len() > max);
        if too_few || too_many {
            let expected = match signature.max_args {
                Some(max) if max == signature.min_args => max.to_string(),
                Some(max) => format!("{}〜{}", signature.min_args, max),
                None => format!("{}以上", signature.min_args),
            };
            return Err(FormulaError::Arity { name: name.to_string(), expected, found: args.len() });
        }
        Ok(Expr::Call(signature.function, args))
    }
}

/// 二項演算子と優先順位（大きいほど強く結合）
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let op = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::Ne, 3),
        TokenKind::Lt => (BinaryOp::Lt, 4),
        TokenKind::Le => (BinaryOp::Le, 4),
        TokenKind::Gt => (BinaryOp::Gt, 4),
        TokenKind::Ge => (BinaryOp::Ge, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Rem, 6),
        _ => return None,
    };
    Some(op)
}
