//The quote macro can require a high recursion limit
#![recursion_limit = "256"]

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{FnArg, ItemTrait, LitStr, ReturnType, TraitItem, TraitItemMethod, Type};

/// The main macro which does the magic. When applied to a trait `Foo`, it
/// generates a `FooClient` type wrapping a `simrpc::ClientEnd` with one
/// boolean-returning method per handler, as well as a `foo_service`
/// constructor which builds a `simrpc::Service` dispatching to an
/// implementation of the trait.
///
/// A trait method is a handler iff it takes `&self`, an argument by value
/// and a `&mut` reply reference, and returns nothing. Methods of any other
/// shape are left on the trait but are not reachable via RPC.
///
/// See the simrpc crate-level documentation for examples.
#[proc_macro_attribute]
pub fn service(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut result: TokenStream2 = input.clone().into();

    let ast_trait: ItemTrait = match syn::parse(input) {
        Ok(t) => t,
        Err(e) => panic!("#[service] must be applied to a trait: {}", e),
    };

    let trait_ident = ast_trait.ident.clone();

    let mut handlers: Vec<TraitItemMethod> = Vec::new();
    for item in ast_trait.items {
        if let TraitItem::Method(m) = item {
            if is_handler(&m) {
                handlers.push(m);
            }
        }
    }

    result.extend(create_client(&trait_ident, &handlers));
    result.extend(create_service_fn(&trait_ident, &handlers));

    result.into()
}

fn client_ident(trait_ident: &Ident) -> Ident {
    Ident::new(&format!("{}Client", trait_ident), Span::call_site())
}

fn service_fn_ident(trait_ident: &Ident) -> Ident {
    Ident::new(
        &format!("{}_service", snake_case(&trait_ident.to_string())),
        Span::call_site(),
    )
}

fn make_ident_literal_str(ident: &Ident) -> LitStr {
    let as_str = format!("{}", ident);
    LitStr::new(&as_str, Span::call_site())
}

fn snake_case(ident: &str) -> String {
    let mut out = String::new();
    for (i, ch) in ident.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// True for methods of the handler shape:
//     fn name(&self, args: A, reply: &mut R);
fn is_handler(method: &TraitItemMethod) -> bool {
    let sig = &method.sig;
    if sig.asyncness.is_some() || sig.unsafety.is_some() || !sig.generics.params.is_empty() {
        return false;
    }
    if !matches!(sig.output, ReturnType::Default) {
        return false;
    }
    if sig.inputs.len() != 3 {
        return false;
    }
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver)) => {
            if receiver.reference.is_none() || receiver.mutability.is_some() {
                return false;
            }
        }
        _ => return false,
    }
    // the reply must be a &mut reference
    match sig.inputs.last() {
        Some(FnArg::Typed(arg)) => match &*arg.ty {
            Type::Reference(r) => r.mutability.is_some(),
            _ => false,
        },
        _ => false,
    }
}

// Argument and reply types of a handler method, with the reply's `&mut`
// stripped. Only called for methods `is_handler` accepted.
fn handler_types(method: &TraitItemMethod) -> (Type, Type) {
    let mut typed = method.sig.inputs.iter().filter_map(|arg| match arg {
        FnArg::Typed(t) => Some(t),
        FnArg::Receiver(_) => None,
    });
    let args_ty = (*typed.next().expect("handler argument").ty).clone();
    let reply_ty = match &*typed.next().expect("handler reply").ty {
        Type::Reference(r) => (*r.elem).clone(),
        _ => panic!("handler reply must be a &mut reference"),
    };
    (args_ty, reply_ty)
}

fn create_client(trait_ident: &Ident, handlers: &[TraitItemMethod]) -> TokenStream2 {
    let client_ident = client_ident(trait_ident);

    let mut method_impl_tokens = TokenStream2::new();
    for method in handlers {
        let ident = &method.sig.ident;
        let (args_ty, reply_ty) = handler_types(method);
        let fq_literal = LitStr::new(
            &format!("{}.{}", trait_ident, ident),
            Span::call_site(),
        );
        method_impl_tokens.extend(quote!(
            pub fn #ident(&self, args: &#args_ty, reply: &mut #reply_ty) -> bool {
                self.end.call(#fq_literal, args, reply)
            }
        ));
    }

    quote!(
        #[derive(Clone)]
        pub struct #client_ident {
            end: simrpc::ClientEnd,
        }

        impl #client_ident {
            pub fn new(end: simrpc::ClientEnd) -> Self {
                #client_ident { end }
            }

            #method_impl_tokens
        }
    )
}

fn create_service_fn(trait_ident: &Ident, handlers: &[TraitItemMethod]) -> TokenStream2 {
    let fn_ident = service_fn_ident(trait_ident);
    let name_literal = make_ident_literal_str(trait_ident);

    let mut add_handler_tokens = TokenStream2::new();
    for method in handlers {
        let ident = &method.sig.ident;
        let ident_literal = make_ident_literal_str(ident);
        let (args_ty, reply_ty) = handler_types(method);
        add_handler_tokens.extend(quote!(
            {
                let imp = std::sync::Arc::clone(&imp);
                builder.add_handler(
                    #ident_literal,
                    move |args: #args_ty, reply: &mut #reply_ty| imp.#ident(args, reply),
                );
            }
        ));
    }

    quote!(
        pub fn #fn_ident<T>(imp: T) -> simrpc::Service
        where
            T: #trait_ident + Send + Sync + 'static,
        {
            let imp = std::sync::Arc::new(imp);
            let mut builder = simrpc::ServiceBuilder::new(#name_literal);
            #add_handler_tokens
            builder.build()
        }
    )
}
